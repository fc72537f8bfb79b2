//! Machine nodes and per-command task generation.
//!
//! A [`MachineNode`] pairs the resolved topology node with the provider
//! plugin its `class` selected. Task generation consults the machine's
//! canonical state so that converging an already-converged machine
//! contributes no work.

use crate::boxes::{BoxStorage, FileFetcher};
use crate::command::Command;
use crate::comm::Communicator;
use crate::error::{CoreError, Result};
use crate::provider::ProviderPlugin;
use crate::registry::Registry;
use crate::scheduler::{Task, TaskEdge};
use crate::topology::attr::{AttrDefault, AttrDescriptor, AttrKind, AttrValue};
use crate::topology::node::{BASE_CLASS, BASE_NAME, BASE_UUID, NodeFamily, NodeRef};
use crate::topology::{box_node, interface};
use serde_yaml::Mapping;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Attribute schema for machine nodes (also used for the global node).
pub const SCHEMA: &[AttrDescriptor] = &[
    BASE_NAME,
    BASE_CLASS,
    BASE_UUID,
    AttrDescriptor::new("state", AttrKind::Str)
        .with_default(AttrDefault::Str(""))
        .persisted(),
    AttrDescriptor::new("hostname", AttrKind::Str),
    AttrDescriptor::new("memory", AttrKind::Int).with_default(AttrDefault::Int(1024)),
    AttrDescriptor::new("cpus", AttrKind::Int).with_default(AttrDefault::Int(1)),
    AttrDescriptor::new("guest", AttrKind::Str).with_default(AttrDefault::Str("linux")),
    AttrDescriptor::new("communicator", AttrKind::Str).with_default(AttrDefault::Str("")),
    AttrDescriptor::new("box", AttrKind::Node(NodeFamily::Box)),
    AttrDescriptor::new("interfaces", AttrKind::NodeList(NodeFamily::Interface))
        .copied()
        .appending()
        .with_default(AttrDefault::EmptyList),
    AttrDescriptor::new("shared_folders", AttrKind::NodeList(NodeFamily::SharedFolder))
        .copied()
        .appending()
        .with_default(AttrDefault::EmptyList),
    AttrDescriptor::new("provisioners", AttrKind::NodeList(NodeFamily::Provisioner))
        .copied()
        .appending()
        .with_default(AttrDefault::EmptyList),
];

/// Canonical, provider-agnostic machine state.
///
/// Providers map their native states into this set; the core enforces no
/// transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// Powered on and booted.
    Running,
    /// Suspended, resumable.
    Paused,
    /// Crashed or killed outside our control.
    Aborted,
    /// Cleanly powered off.
    PowerDown,
    /// Boot in progress.
    Starting,
    /// Shutdown in progress.
    Stopping,
    /// Never queried, or the provider could not tell.
    Unknown,
}

impl MachineState {
    /// The persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Aborted => "aborted",
            Self::PowerDown => "powerdown",
            Self::Starting => "starting",
            Self::Stopping => "stopping",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a persisted state string. Anything unrecognized is `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "paused" => Self::Paused,
            "aborted" => Self::Aborted,
            "powerdown" => Self::PowerDown,
            "starting" => Self::Starting,
            "stopping" => Self::Stopping,
            _ => Self::Unknown,
        }
    }

    /// True for states a power-down can act on.
    #[must_use]
    pub const fn is_up(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Starting)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for sequential task chains.
///
/// Each pushed task depends on the previously pushed one, which is how a
/// machine expresses "create, then network, then power up" without wiring
/// edges by hand.
#[derive(Default)]
pub struct TaskChain {
    edges: Vec<TaskEdge>,
    last: Option<Task>,
}

impl TaskChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task depending on the chain's current tail.
    pub fn push(&mut self, task: Task) {
        let edge = match self.last.take() {
            Some(prev) => TaskEdge::after(task.clone(), prev),
            None => TaskEdge::root(task.clone()),
        };
        self.edges.push(edge);
        self.last = Some(task);
    }

    /// True when nothing was pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The chain's current tail task.
    #[must_use]
    pub fn last(&self) -> Option<&Task> {
        self.last.as_ref()
    }

    /// Consumes the chain into scheduler edges.
    #[must_use]
    pub fn into_edges(self) -> Vec<TaskEdge> {
        self.edges
    }
}

/// Shared lookups task generation needs beyond the machine itself.
pub struct TaskContext<'a> {
    /// Plugin registry for communicator, guest, and provisioner classes.
    pub registry: &'a Registry,
    /// Topology-level networks, referenced by interfaces by name.
    pub networks: &'a [NodeRef],
    /// Box archive storage, consulted when a machine's box is missing.
    pub boxes: &'a BoxStorage,
}

/// A resolved machine bound to its provider plugin.
#[derive(Clone)]
pub struct MachineNode {
    node: NodeRef,
    plugin: Rc<dyn ProviderPlugin>,
}

impl MachineNode {
    /// Pairs a resolved machine node with its provider plugin.
    #[must_use]
    pub fn new(node: NodeRef, plugin: Rc<dyn ProviderPlugin>) -> Self {
        Self { node, plugin }
    }

    /// The underlying topology node.
    #[must_use]
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Machine name.
    #[must_use]
    pub fn name(&self) -> String {
        self.node.name()
    }

    /// Provider class name.
    #[must_use]
    pub fn class_name(&self) -> String {
        self.node.class_name()
    }

    /// External identifier, empty until the provider created the machine.
    #[must_use]
    pub fn uuid(&self) -> String {
        self.node.uuid()
    }

    /// Records the external identifier.
    pub fn set_uuid(&self, uuid: &str) {
        self.node.set("uuid", AttrValue::Str(uuid.to_string()));
    }

    /// Canonical state as last recorded.
    #[must_use]
    pub fn state(&self) -> MachineState {
        MachineState::parse(&self.node.get_str("state").unwrap_or_default())
    }

    /// Records a canonical state.
    pub fn set_state(&self, state: MachineState) {
        self.node
            .set("state", AttrValue::Str(state.as_str().to_string()));
    }

    /// Clears the recorded state so nothing is persisted for it.
    pub fn clear_state(&self) {
        self.node.set("state", AttrValue::Str(String::new()));
    }

    /// Guest hostname, falling back to the machine name.
    #[must_use]
    pub fn hostname(&self) -> String {
        match self.node.get_str("hostname") {
            Some(h) if !h.is_empty() => h,
            _ => self.name(),
        }
    }

    /// Declared interfaces, global defaults included.
    #[must_use]
    pub fn interfaces(&self) -> Vec<NodeRef> {
        self.node.get_nodes("interfaces")
    }

    /// Declared shared folders, global defaults included.
    #[must_use]
    pub fn shared_folders(&self) -> Vec<NodeRef> {
        self.node.get_nodes("shared_folders")
    }

    /// Declared provisioners, global defaults included.
    #[must_use]
    pub fn provisioners(&self) -> Vec<NodeRef> {
        self.node.get_nodes("provisioners")
    }

    /// The machine's box template, if any.
    #[must_use]
    pub fn box_node(&self) -> Option<NodeRef> {
        self.node.get_node("box")
    }

    /// Persisted attribute snapshot.
    #[must_use]
    pub fn state_dict(&self) -> Mapping {
        self.node.state_dict()
    }

    /// The communicator for this machine, or `None` when no class is set.
    ///
    /// # Errors
    ///
    /// Returns a component-not-found error for an unregistered class.
    pub fn communicator(&self, registry: &Registry) -> Result<Option<Rc<dyn Communicator>>> {
        let class = self.node.get_str("communicator").unwrap_or_default();
        if class.is_empty() {
            return Ok(None);
        }
        registry.communicator(&class).map(Some)
    }

    /// Contributes this machine's task edges for a command.
    ///
    /// # Errors
    ///
    /// Fails before any scheduling on unknown plugin classes or dangling
    /// network references.
    pub fn tasks_for(&self, command: Command, ctx: &TaskContext<'_>) -> Result<Vec<TaskEdge>> {
        match command {
            Command::Up => self.tasks_up(ctx),
            Command::Down => Ok(self.tasks_down()),
            Command::Pause => Ok(self.tasks_pause()),
            Command::Destroy => Ok(self.tasks_destroy()),
            Command::Net => self.tasks_net(ctx),
            Command::Provision => self.tasks_provision(ctx),
        }
    }

    fn tasks_up(&self, ctx: &TaskContext<'_>) -> Result<Vec<TaskEdge>> {
        let mut chain = TaskChain::new();
        let driver = self.plugin.driver();

        if self.uuid().is_empty() {
            // The archive must be in storage before the provider imports it.
            if let Some(bx) = self.box_node() {
                if box_node::is_missing(&bx) {
                    let storage = ctx.boxes.clone();
                    let b = Rc::clone(&bx);
                    chain.push(Task::new(
                        format!("fetch {} ({})", bx.name(), self.name()),
                        move || {
                            let url = b.get_str("url").unwrap_or_default();
                            storage.ensure(&b.name(), &url, &FileFetcher)?;
                            storage.refresh(&b);
                            Ok(())
                        },
                    ));
                }
            }

            let m = self.clone();
            let d = Rc::clone(&driver);
            let b = self.box_node();
            chain.push(Task::new(format!("create {}", self.name()), move || {
                d.import_appliance(b.as_ref(), &m)
            }));
        }

        self.push_interface_tasks(&mut chain, ctx, &driver)?;

        if self.state() != MachineState::Running {
            let m = self.clone();
            let d = Rc::clone(&driver);
            chain.push(Task::new(format!("power-up {}", self.name()), move || {
                d.power_up(&m)
            }));
        }

        if let Some(comm) = self.communicator(ctx.registry)? {
            let guest_class = self.node.get_str("guest").unwrap_or_default();
            let guest = ctx.registry.guest(&guest_class)?;

            let hostname = self.hostname();
            let g = Rc::clone(&guest);
            let c = Rc::clone(&comm);
            chain.push(Task::new(format!("hostname {}", self.name()), move || {
                g.change_hostname(c.as_ref(), &hostname)
            }));

            for (ordinal, iface) in self.interfaces().iter().enumerate() {
                let device = interface::device_name(iface, ordinal as i64);
                let g = Rc::clone(&guest);
                let c = Rc::clone(&comm);
                let i = Rc::clone(iface);
                chain.push(Task::new(
                    format!("guest-iface {device} on {}", self.name()),
                    move || g.setup_interface(c.as_ref(), &i, &device),
                ));
            }

            for folder in self.shared_folders() {
                if folder.get_bool("automount") != Some(true) {
                    continue;
                }
                let g = Rc::clone(&guest);
                let c = Rc::clone(&comm);
                let f = Rc::clone(&folder);
                chain.push(Task::new(
                    format!("mount {} on {}", folder.name(), self.name()),
                    move || {
                        g.mkdir(c.as_ref(), &f.get_str("remote").unwrap_or_default())?;
                        g.mount(c.as_ref(), &f)
                    },
                ));
            }
        }

        Ok(chain.into_edges())
    }

    fn tasks_down(&self) -> Vec<TaskEdge> {
        if !self.state().is_up() {
            debug!(machine = self.name(), "not up, nothing to power down");
            return Vec::new();
        }
        let m = self.clone();
        let d = self.plugin.driver();
        vec![TaskEdge::root(Task::new(
            format!("power-down {}", self.name()),
            move || d.power_down(&m),
        ))]
    }

    fn tasks_pause(&self) -> Vec<TaskEdge> {
        if self.state() != MachineState::Running {
            return Vec::new();
        }
        let m = self.clone();
        let d = self.plugin.driver();
        vec![TaskEdge::root(Task::new(
            format!("pause {}", self.name()),
            move || d.pause(&m),
        ))]
    }

    fn tasks_destroy(&self) -> Vec<TaskEdge> {
        let mut chain = TaskChain::new();
        let driver = self.plugin.driver();

        if self.state().is_up() {
            let m = self.clone();
            let d = Rc::clone(&driver);
            chain.push(Task::new(format!("power-down {}", self.name()), move || {
                d.power_down(&m)
            }));
        }
        if !self.uuid().is_empty() {
            let m = self.clone();
            let d = Rc::clone(&driver);
            chain.push(Task::new(format!("destroy {}", self.name()), move || {
                d.destroy(&m)
            }));
        }
        chain.into_edges()
    }

    fn tasks_net(&self, ctx: &TaskContext<'_>) -> Result<Vec<TaskEdge>> {
        let mut chain = TaskChain::new();
        let driver = self.plugin.driver();
        self.push_interface_tasks(&mut chain, ctx, &driver)?;
        Ok(chain.into_edges())
    }

    fn tasks_provision(&self, ctx: &TaskContext<'_>) -> Result<Vec<TaskEdge>> {
        if self.state() != MachineState::Running {
            debug!(machine = self.name(), "not running, skipping provisioners");
            return Ok(Vec::new());
        }
        let Some(comm) = self.communicator(ctx.registry)? else {
            debug!(machine = self.name(), "no communicator, skipping provisioners");
            return Ok(Vec::new());
        };

        let mut chain = TaskChain::new();
        for spec in self.provisioners() {
            let class = match spec.class_name() {
                c if c.is_empty() => "shell".to_string(),
                c => c,
            };
            let plugin = ctx.registry.provisioner(&class)?;
            let m = self.clone();
            let s = Rc::clone(&spec);
            let c = Rc::clone(&comm);
            chain.push(Task::new(
                format!("provision {} on {}", spec.name(), self.name()),
                move || plugin.provision(&m, &s, c.as_ref()),
            ));
        }
        Ok(chain.into_edges())
    }

    fn push_interface_tasks(
        &self,
        chain: &mut TaskChain,
        ctx: &TaskContext<'_>,
        driver: &Rc<dyn crate::provider::ProviderDriver>,
    ) -> Result<()> {
        for iface in self.interfaces() {
            let net_name = iface.get_str("network").unwrap_or_default();
            if !net_name.is_empty() {
                let network = find_network(ctx.networks, &net_name, &iface)?;
                let m = self.clone();
                let d = Rc::clone(driver);
                let n = Rc::clone(&network);
                chain.push(Task::new(
                    format!("net-up {} ({})", net_name, self.name()),
                    move || d.create_network(&m, &n),
                ));
            }
            let m = self.clone();
            let d = Rc::clone(driver);
            let i = Rc::clone(&iface);
            chain.push(Task::new(
                format!("iface {} on {}", iface.name(), self.name()),
                move || d.setup_interface(&m, &i),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for MachineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineNode")
            .field("name", &self.name())
            .field("class", &self.class_name())
            .field("state", &self.state())
            .finish()
    }
}

fn find_network(networks: &[NodeRef], name: &str, iface: &NodeRef) -> Result<NodeRef> {
    networks
        .iter()
        .find(|n| n.name() == name)
        .cloned()
        .ok_or_else(|| {
            CoreError::configuration(format!(
                "interface \"{}\" references unknown network \"{name}\"",
                iface.name()
            ))
        })
}
