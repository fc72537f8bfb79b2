//! Remote command execution.
//!
//! A [`Communicator`] is how the core reaches into a guest (or, for the
//! built-in `local` class, the host itself). A non-zero exit status is a
//! normal [`CommandOutput`], never an error: only transport-level failures
//! surface as [`CommError`], with "not connected" kept distinct so callers
//! can decide whether to wait or give up.

use std::collections::BTreeMap;
use std::io::Write;
use std::process;
use thiserror::Error;
use tracing::debug;

/// Transport-level communicator failure.
#[derive(Debug, Error)]
pub enum CommError {
    /// No session is established. Distinct from a command that ran and
    /// exited non-zero.
    #[error("communicator is not connected")]
    NotConnected,

    /// Transport I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The transport rejected the request.
    #[error("communicator failure: {0}")]
    Failed(String),
}

/// Result type for communicator operations.
pub type CommResult<T> = std::result::Result<T, CommError>;

/// Captured result of one executed command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// True when the command exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command execution channel into a machine.
pub trait Communicator {
    /// Runs a command with the given environment.
    ///
    /// # Errors
    ///
    /// Returns a transport error; a non-zero exit is reported through the
    /// output, not as an error.
    fn run(&self, cmd: &[String], env: &BTreeMap<String, String>) -> CommResult<CommandOutput>;

    /// Runs a command with elevated privileges.
    ///
    /// # Errors
    ///
    /// Same contract as [`run`](Self::run).
    fn sudo(&self, cmd: &[String]) -> CommResult<CommandOutput>;

    /// Writes a file at the given remote path.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the content cannot be delivered.
    fn write_file(&self, content: &[u8], remote_path: &str) -> CommResult<()>;
}

/// Communicator with no session. Every operation reports `NotConnected`.
///
/// The default for machines that declare no communicator class.
#[derive(Debug, Default)]
pub struct NullCommunicator;

impl Communicator for NullCommunicator {
    fn run(&self, _cmd: &[String], _env: &BTreeMap<String, String>) -> CommResult<CommandOutput> {
        Err(CommError::NotConnected)
    }

    fn sudo(&self, _cmd: &[String]) -> CommResult<CommandOutput> {
        Err(CommError::NotConnected)
    }

    fn write_file(&self, _content: &[u8], _remote_path: &str) -> CommResult<()> {
        Err(CommError::NotConnected)
    }
}

/// Runs commands directly on the host.
///
/// Used by provisioners and guests of machines that are in fact local
/// namespaces or test doubles.
#[derive(Debug, Default)]
pub struct LocalShell;

impl LocalShell {
    fn spawn(cmd: &[String], env: &BTreeMap<String, String>) -> CommResult<CommandOutput> {
        let (program, args) = cmd
            .split_first()
            .ok_or_else(|| CommError::Failed("empty command".to_string()))?;

        debug!(command = program.as_str(), "running local command");
        let output = process::Command::new(program)
            .args(args)
            .envs(env)
            .output()?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Communicator for LocalShell {
    fn run(&self, cmd: &[String], env: &BTreeMap<String, String>) -> CommResult<CommandOutput> {
        Self::spawn(cmd, env)
    }

    fn sudo(&self, cmd: &[String]) -> CommResult<CommandOutput> {
        // No privilege escalation for the host shell.
        Self::spawn(cmd, &BTreeMap::new())
    }

    fn write_file(&self, content: &[u8], remote_path: &str) -> CommResult<()> {
        let mut file = std::fs::File::create(remote_path)?;
        file.write_all(content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_communicator_reports_not_connected() {
        let comm = NullCommunicator;
        let err = comm.sudo(&["true".to_string()]).unwrap_err();
        assert!(matches!(err, CommError::NotConnected));
    }

    #[test]
    fn test_local_shell_captures_exit_code() {
        let comm = LocalShell;
        let out = comm
            .run(&["sh".into(), "-c".into(), "exit 3".into()], &BTreeMap::new())
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[test]
    fn test_local_shell_captures_stdout() {
        let comm = LocalShell;
        let out = comm
            .run(
                &["sh".into(), "-c".into(), "printf hello".into()],
                &BTreeMap::new(),
            )
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let comm = LocalShell;
        assert!(comm.run(&[], &BTreeMap::new()).is_err());
    }
}
