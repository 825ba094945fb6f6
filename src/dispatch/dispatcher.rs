//! Command Dispatcher
//!
//! Turns a parsed command line into the bytes written back to the client.
//!
//! ```text
//!   CommandInvocation
//!          │
//!          ▼
//!   whitelisted? ──no──> Rejected("command <name> not permitted\n")
//!          │
//!         yes
//!          ▼
//!   spawn <executable> name args...      (argument vector, no shell)
//!          │
//!          ├── exit 0 ──────> Output(stdout)
//!          └── error/exit≠0 ─> Failed("command execution error\n")
//! ```
//!
//! The arguments are passed to the executable as separate argv entries, so
//! shell metacharacters in them (`;`, `|`, `$(...)`) are plain text.
//! Failure detail (exit status, stderr) is logged, never sent to the client.

use crate::dispatch::Whitelist;
use crate::protocol::response;
use crate::protocol::CommandInvocation;
use bytes::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Executable invoked for whitelisted commands when none is configured.
pub const DEFAULT_EXECUTABLE: &str = "./shell";

/// What a connection does after a command fails to execute.
///
/// Whitelist rejections always keep the connection open; this only covers
/// spawn failures and non-zero exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecFailurePolicy {
    /// Send the error line, then close the connection
    #[default]
    Close,
    /// Send the error line and keep reading commands
    Continue,
}

/// The result of dispatching one command. Every variant carries the payload
/// to write back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The command name is not whitelisted; nothing was executed
    Rejected(Bytes),
    /// The executable exited successfully; its stdout
    Output(Bytes),
    /// The executable could not be run or exited non-zero
    Failed(Bytes),
}

impl DispatchOutcome {
    pub fn payload(&self) -> &Bytes {
        match self {
            DispatchOutcome::Rejected(b)
            | DispatchOutcome::Output(b)
            | DispatchOutcome::Failed(b) => b,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DispatchOutcome::Failed(_))
    }
}

/// Internal execution errors. Logged, then mapped to [`DispatchOutcome::Failed`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The executable could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The executable ran but reported failure
    #[error("command exited with {status}")]
    NonZeroExit { status: ExitStatus, stderr: String },
}

/// Checks commands against the whitelist and runs permitted ones.
///
/// Cheap to clone; clones share the whitelist.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    whitelist: Arc<Whitelist>,
    executable: PathBuf,
}

impl CommandDispatcher {
    pub fn new(whitelist: Whitelist, executable: impl Into<PathBuf>) -> Self {
        Self {
            whitelist: Arc::new(whitelist),
            executable: executable.into(),
        }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Dispatches one command. Never fails: every outcome has a payload.
    pub async fn dispatch(&self, command: &CommandInvocation) -> DispatchOutcome {
        if !self.whitelist.contains(&command.name) {
            warn!(command = %command.name, "Unauthorized command attempt");
            return DispatchOutcome::Rejected(response::not_permitted(&command.name));
        }

        match self.execute(command).await {
            Ok(stdout) => {
                debug!(
                    command = %command.name,
                    args = command.args.len(),
                    bytes = stdout.len(),
                    "Command executed"
                );
                DispatchOutcome::Output(stdout)
            }
            Err(DispatchError::NonZeroExit { status, stderr }) => {
                error!(
                    command = %command.name,
                    %status,
                    stderr = %stderr,
                    "Command execution failed"
                );
                DispatchOutcome::Failed(response::execution_error())
            }
            Err(e) => {
                error!(command = %command.name, error = %e, "Command execution failed");
                DispatchOutcome::Failed(response::execution_error())
            }
        }
    }

    /// Runs the executable with `name args...` and captures stdout.
    async fn execute(&self, command: &CommandInvocation) -> Result<Bytes, DispatchError> {
        let output = Command::new(&self.executable)
            .args(command.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DispatchError::Spawn {
                program: self.executable.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(DispatchError::NonZeroExit {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(Bytes::from(output.stdout))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn invocation(line: &str) -> CommandInvocation {
        CommandInvocation::parse(line.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_whitelisted_command_returns_stdout_verbatim() {
        let dispatcher = CommandDispatcher::new(Whitelist::new(["ls"]), "echo");

        let outcome = dispatcher.dispatch(&invocation("ls")).await;

        assert_eq!(outcome, DispatchOutcome::Output(Bytes::from("ls\n")));
    }

    #[tokio::test]
    async fn test_arguments_are_passed_as_argv() {
        let dispatcher = CommandDispatcher::new(Whitelist::new(["getpath"]), "echo");

        let outcome = dispatcher.dispatch(&invocation("getpath  a   b")).await;

        assert_eq!(outcome, DispatchOutcome::Output(Bytes::from("getpath a b\n")));
    }

    #[tokio::test]
    async fn test_rejected_command_is_not_executed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let marker_name = marker.to_str().unwrap().to_string();

        // `touch <name>` would create the marker if it ever ran.
        let dispatcher = CommandDispatcher::new(Whitelist::new(["ls"]), "touch");
        let outcome = dispatcher.dispatch(&invocation(&marker_name)).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Rejected(Bytes::from(format!(
                "command {} not permitted\n",
                marker_name
            )))
        );
        assert!(!marker.exists());

        // Same command, whitelisted: the executable does run.
        let dispatcher = CommandDispatcher::new(Whitelist::new([marker_name.clone()]), "touch");
        let outcome = dispatcher.dispatch(&invocation(&marker_name)).await;
        assert!(matches!(outcome, DispatchOutcome::Output(_)));
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_rm_rejected_with_name() {
        let dispatcher = CommandDispatcher::new(Whitelist::new(["ls"]), "echo");

        let outcome = dispatcher.dispatch(&invocation("rm -rf /")).await;

        assert_eq!(
            outcome.payload(),
            &Bytes::from_static(b"command rm not permitted\n")
        );
        assert!(!outcome.is_failure());
    }

    #[tokio::test]
    async fn test_shell_metacharacters_are_not_interpreted() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("pwned");
        let line = format!("getpath ;touch {}", marker.display());

        let dispatcher = CommandDispatcher::new(Whitelist::new(["getpath"]), "echo");
        let outcome = dispatcher.dispatch(&invocation(&line)).await;

        assert_eq!(outcome, DispatchOutcome::Output(Bytes::from(format!("{}\n", line))));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_generic_failure() {
        let dispatcher = CommandDispatcher::new(Whitelist::new(["ls"]), "false");

        let outcome = dispatcher.dispatch(&invocation("ls")).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Failed(Bytes::from_static(b"command execution error\n"))
        );
        assert!(outcome.is_failure());
    }

    #[tokio::test]
    async fn test_missing_executable_is_generic_failure() {
        let dispatcher =
            CommandDispatcher::new(Whitelist::new(["ls"]), "/nonexistent/shellgate/shell");

        let outcome = dispatcher.dispatch(&invocation("ls")).await;

        assert_eq!(outcome.payload(), &response::execution_error());
    }

    #[tokio::test]
    async fn test_execute_reports_exit_status() {
        let dispatcher = CommandDispatcher::new(Whitelist::new(["ls"]), "false");

        let err = dispatcher.execute(&invocation("ls")).await.unwrap_err();

        assert!(matches!(err, DispatchError::NonZeroExit { .. }));
    }
}
