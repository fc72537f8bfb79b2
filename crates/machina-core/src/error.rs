//! Error types for the core layer.

use machina_error::CommonError;
use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Common errors (I/O, config, not found, etc.).
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Malformed or missing topology fields. Fatal, no retry.
    #[error("topology error: {0}")]
    Configuration(String),

    /// A plugin class name was not registered for its family. Fatal.
    #[error("no {family} component registered under \"{name}\"")]
    ComponentNotFound {
        /// Plugin family (provider, provisioner, guest, communicator).
        family: &'static str,
        /// The class name that was looked up.
        name: String,
    },

    /// The task dependency graph contains a cycle. Fatal.
    ///
    /// The message names at least one member of the cycle.
    #[error("dependency cycle involving: {0}")]
    Cycle(String),

    /// An action failed while the scheduler was aborting on error.
    ///
    /// Wraps the original cause.
    #[error("task \"{action}\" failed: {source}")]
    Task {
        /// Label of the failing action.
        action: String,
        /// The original failure.
        #[source]
        source: Box<CoreError>,
    },

    /// The sidecar state file is present but corrupt. Fatal.
    ///
    /// The operator should inspect the file and remove it if it cannot be
    /// repaired.
    #[error("malformed state file: {0} (inspect and/or remove it)")]
    MalformedState(String),

    /// A provider driver reported a failure. Propagated, never retried here.
    #[error("provider error: {0}")]
    Provider(String),

    /// A communicator transport failure.
    #[error(transparent)]
    Comm(#[from] crate::comm::CommError),
}

impl CoreError {
    /// Creates a new topology configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a new provider error.
    #[must_use]
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Creates a new malformed state file error.
    #[must_use]
    pub fn malformed_state(msg: impl Into<String>) -> Self {
        Self::MalformedState(msg.into())
    }

    /// Returns true if this is a dependency cycle error.
    #[must_use]
    pub const fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle(_))
    }

    /// Returns true if this is a component lookup failure.
    #[must_use]
    pub const fn is_component_not_found(&self) -> bool {
        matches!(self, Self::ComponentNotFound { .. })
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Common(CommonError::from(err))
    }
}
