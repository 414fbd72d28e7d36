//! Remote session seam
//!
//! The core never speaks the wire protocol itself. It asks a `SessionProvider`
//! for an authenticated `RemoteSession` and runs commands over it. A session
//! belongs to the task that opened it and is closed on every exit path:
//! explicitly via `close()` on normal paths, by `Drop` when a task is cancelled
//! mid-phase.

#[cfg(feature = "ssh")]
pub mod ssh;

use crate::error::{CommandError, SessionError};
use crate::models::{Credential, Endpoint};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Raw result of one remote command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// stdout followed by stderr
    pub text: String,
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exit_status: Some(0),
        }
    }
}

/// Opens authenticated sessions
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    type Session: RemoteSession;

    async fn open(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
    ) -> Result<Self::Session, SessionError>;
}

/// An open, authenticated channel to one host
///
/// Implementations open a fresh sub-channel per `exec` and close it before
/// returning, whatever the outcome.
#[async_trait]
pub trait RemoteSession: Send + 'static {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, CommandError>;

    /// Release the session. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Open a session, bounded by `timeout` when one is configured
pub async fn open_session<P: SessionProvider>(
    provider: &P,
    endpoint: &Endpoint,
    credential: &Credential,
    timeout: Option<Duration>,
) -> Result<P::Session, SessionError> {
    debug!(endpoint = %endpoint, user = %credential.username, "opening session");

    match timeout {
        Some(limit) => tokio::time::timeout(limit, provider.open(endpoint, credential))
            .await
            .map_err(|_| SessionError::Timeout {
                endpoint: endpoint.to_string(),
                timeout: limit,
            })?,
        None => provider.open(endpoint, credential).await,
    }
}
