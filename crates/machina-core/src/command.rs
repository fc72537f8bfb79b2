//! The closed set of convergence commands.

use std::fmt;

/// A convergence command that machines contribute tasks for.
///
/// Each variant maps to one task-generation pass over the topology. Commands
/// a node does not support simply contribute an empty edge list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Create, power up, and configure machines.
    Up,
    /// Power machines down.
    Down,
    /// Pause running machines.
    Pause,
    /// Power down and remove machines.
    Destroy,
    /// Create and bring up networks and interfaces only.
    Net,
    /// Run provisioners on running machines.
    Provision,
}

impl Command {
    /// All supported commands, in a stable order.
    pub const ALL: [Self; 6] = [
        Self::Up,
        Self::Down,
        Self::Pause,
        Self::Destroy,
        Self::Net,
        Self::Provision,
    ];

    /// Returns the command name as used on the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Pause => "pause",
            Self::Destroy => "destroy",
            Self::Net => "net",
            Self::Provision => "provision",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = Command::ALL.iter().map(|c| c.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Command::ALL.len());
    }
}
