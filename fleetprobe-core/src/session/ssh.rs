//! SSH session provider on top of `russh`
//!
//! Password authentication only. Host keys are accepted without pinning:
//! targets are inventory devices whose keys are not known in advance.

use super::{CommandOutput, RemoteSession, SessionProvider};
use crate::config::SshConf;
use crate::error::{CommandError, SessionError};
use crate::models::{Credential, Endpoint};
use async_trait::async_trait;
use russh::client::{self, AuthResult, Handle};
use russh::keys::PublicKey;
use russh::{ChannelMsg, Disconnect};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

struct AcceptAnyHostKey;

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Opens password-authenticated SSH sessions
#[derive(Clone)]
pub struct SshSessionProvider {
    config: Arc<client::Config>,
}

impl SshSessionProvider {
    pub fn new(conf: &SshConf) -> Self {
        let config = client::Config {
            inactivity_timeout: conf.inactivity_timeout_secs.map(Duration::from_secs),
            keepalive_interval: conf.keepalive_secs.map(Duration::from_secs),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl SessionProvider for SshSessionProvider {
    type Session = SshSession;

    async fn open(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
    ) -> Result<SshSession, SessionError> {
        let mut handle = client::connect(
            self.config.clone(),
            (endpoint.address.as_str(), endpoint.port),
            AcceptAnyHostKey,
        )
        .await
        .map_err(|e| SessionError::Connect {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        let auth = handle
            .authenticate_password(credential.username.clone(), credential.password.clone())
            .await
            .map_err(|e| SessionError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        if !matches!(auth, AuthResult::Success) {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await;
            return Err(SessionError::AuthRejected {
                endpoint: endpoint.to_string(),
                username: credential.username.clone(),
            });
        }

        debug!(endpoint = %endpoint, user = %credential.username, "ssh session established");
        Ok(SshSession {
            handle: Some(handle),
            endpoint: endpoint.to_string(),
        })
    }
}

/// One authenticated SSH connection
pub struct SshSession {
    handle: Option<Handle<AcceptAnyHostKey>>,
    endpoint: String,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, CommandError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| CommandError::Channel("session already closed".to_string()))?;

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| CommandError::Channel(e.to_string()))?;

        let result = async {
            channel
                .exec(true, command)
                .await
                .map_err(|e| CommandError::Failed {
                    command: command.to_string(),
                    reason: e.to_string(),
                })?;

            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let mut exit_status = None;

            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                    ChannelMsg::ExtendedData { ref data, .. } => stderr.extend_from_slice(data),
                    ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                    _ => {}
                }
            }

            stdout.extend_from_slice(&stderr);
            Ok(CommandOutput {
                text: String::from_utf8_lossy(&stdout).into_owned(),
                exit_status,
            })
        }
        .await;

        // sub-channel is single-use, released whatever happened above
        let _ = channel.close().await;
        result
    }

    async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
                warn!(endpoint = %self.endpoint, "ssh disconnect failed: {}", e);
            }
        }
    }
}
