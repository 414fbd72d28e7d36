//! Remote command execution for fleetprobe work items
//!
//! Runs one command string over an open session:
//! - One fresh sub-channel per command (handled by the session)
//! - Optional timeout per command
//! - Any failure is opaque: transport error, non-zero exit, timeout

use crate::error::CommandError;
use crate::session::RemoteSession;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Text produced by a successful command run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: String,
    pub execution_time_ms: u128,
}

/// Executes diagnostic commands over a session
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Execute `command` and return its trimmed combined output
    pub async fn run<S: RemoteSession>(
        &self,
        session: &mut S,
        command: &str,
    ) -> Result<ExecutionResult, CommandError> {
        let start_time = Instant::now();
        debug!("Executing remote command: {} (timeout: {:?})", command, self.timeout);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, session.exec(command))
                .await
                .map_err(|_| CommandError::Timeout {
                    command: command.to_string(),
                    timeout: limit,
                })??,
            None => session.exec(command).await?,
        };

        let execution_time_ms = start_time.elapsed().as_millis();

        match output.exit_status {
            Some(0) | None => {
                debug!(elapsed_ms = execution_time_ms as u64, "command '{}' done", command);
                Ok(ExecutionResult {
                    output: output.text.trim().to_string(),
                    execution_time_ms,
                })
            }
            Some(code) => Err(CommandError::Failed {
                command: command.to_string(),
                reason: format!("exited with status {}", code),
            }),
        }
    }
}
