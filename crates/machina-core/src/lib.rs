//! Machina core: topology resolution and convergence scheduling.
//!
//! The core turns a declarative topology document into an ordered plan of
//! idempotent actions and tracks just enough durable state to make re-runs
//! converge instead of re-provision. The pieces, leaf first:
//!
//! - [`topology`]: the node tree, attribute inheritance, and the root
//!   aggregate that decodes documents and merges persisted state.
//! - [`registry`]: class-name to plugin resolution per capability family.
//! - [`scheduler`]: cycle-checked topological task execution.
//! - [`state`]: the sidecar state file.
//! - [`provider`], [`comm`], [`guest`], [`provision`], [`boxes`]: the
//!   capability seams hypervisor-specific code plugs into, with dry-run and
//!   Linux built-ins.

pub mod boxes;
pub mod comm;
pub mod command;
pub mod config;
pub mod error;
pub mod guest;
pub mod provider;
pub mod provision;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod topology;

pub use command::Command;
pub use config::Config;
pub use error::{CoreError, Result};
pub use registry::Registry;
pub use scheduler::{Scheduler, Task, TaskEdge};
pub use state::StateStore;
pub use topology::Topology;
pub use topology::machine::{MachineNode, MachineState};
