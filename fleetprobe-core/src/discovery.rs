//! Credential discovery
//!
//! Races every candidate credential against its host in one dispatch. The first
//! attempt to authenticate (and pass the optional probe command) claims the host
//! in the `DedupMap`; later successes for the same host are counted as
//! duplicates and produce no notice.

use crate::aggregate::{collect_outcomes, DedupMap, ItemFailure, RecordSink};
use crate::dispatch::{DispatchSummary, Dispatcher, ItemOutcome, WorkItem};
use crate::error::TaskError;
use crate::execution::CommandRunner;
use crate::models::{Credential, DiscoveryNotice, DiscoveryRequest, Endpoint, ItemState};
use crate::session::{open_session, RemoteSession, SessionProvider};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// One credential tried against one host
#[derive(Debug, Clone)]
pub struct CredentialAttempt {
    pub endpoint: Endpoint,
    pub credential: Credential,
}

impl WorkItem for CredentialAttempt {
    fn label(&self) -> String {
        format!("{}@{}", self.credential.username, self.endpoint)
    }
}

/// How a successful attempt ended
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Won(DiscoveryNotice),
    /// Authenticated, but another credential got there first
    Duplicate,
}

/// Result of one discovery run
#[derive(Debug)]
pub struct DiscoveryReport {
    pub summary: DispatchSummary,
    /// Host address -> winning credential
    pub winners: HashMap<String, Credential>,
    pub duplicates: usize,
    pub sink_errors: usize,
    pub failures: Vec<ItemFailure>,
}

struct DiscoveryContext<P> {
    provider: Arc<P>,
    dedup: DedupMap,
    probe_command: Option<String>,
    runner: CommandRunner,
    connect_timeout: Option<Duration>,
}

/// Races credentials against hosts
pub struct Discovery<P> {
    provider: Arc<P>,
    dispatcher: Dispatcher,
    probe_command: Option<String>,
    runner: CommandRunner,
    connect_timeout: Option<Duration>,
}

impl<P: SessionProvider> Discovery<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            dispatcher: Dispatcher::default(),
            probe_command: None,
            runner: CommandRunner::default(),
            connect_timeout: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Require `command` to succeed before a credential can win
    pub fn with_probe_command(mut self, command: Option<String>) -> Self {
        self.probe_command = command.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_timeouts(mut self, connect: Option<Duration>, command: Option<Duration>) -> Self {
        self.connect_timeout = connect;
        self.runner = CommandRunner::new(command);
        self
    }

    pub async fn discover<S>(&self, request: DiscoveryRequest, sink: &mut S) -> DiscoveryReport
    where
        S: RecordSink<DiscoveryNotice> + ?Sized,
    {
        self.discover_all(vec![request], sink).await
    }

    /// Race every credential of every request; one notice per host at most
    pub async fn discover_all<S>(&self, requests: Vec<DiscoveryRequest>, sink: &mut S) -> DiscoveryReport
    where
        S: RecordSink<DiscoveryNotice> + ?Sized,
    {
        let attempts = expand_attempts(requests);
        let run_id = Uuid::new_v4();
        let span = info_span!("discovery", run = %run_id, attempts = attempts.len());

        async {
            let ctx = Arc::new(DiscoveryContext {
                provider: self.provider.clone(),
                dedup: DedupMap::new(),
                probe_command: self.probe_command.clone(),
                runner: self.runner.clone(),
                connect_timeout: self.connect_timeout,
            });

            let (tx, rx) = mpsc::unbounded_channel::<ItemOutcome<AttemptOutcome>>();
            let worker_ctx = ctx.clone();
            let work = move |attempt: CredentialAttempt| {
                let ctx = worker_ctx.clone();
                async move { ctx.try_credential(attempt).await }
            };

            let (summary, collection) = tokio::join!(
                self.dispatcher.run(attempts, work, tx),
                collect_outcomes(rx, sink, |outcome| match outcome {
                    AttemptOutcome::Won(notice) => Some(notice),
                    AttemptOutcome::Duplicate => None,
                })
            );

            let winners = ctx.dedup.snapshot();
            info!(
                hosts = winners.len(),
                duplicates = collection.suppressed,
                failed = collection.failures.len(),
                "Discovery complete"
            );
            DiscoveryReport {
                summary,
                winners,
                duplicates: collection.suppressed,
                sink_errors: collection.sink_errors,
                failures: collection.failures,
            }
        }
        .instrument(span)
        .await
    }
}

fn expand_attempts(requests: Vec<DiscoveryRequest>) -> Vec<CredentialAttempt> {
    requests
        .into_iter()
        .flat_map(|request| {
            let endpoint = request.endpoint();
            request
                .credentials
                .into_iter()
                .map(move |credential| CredentialAttempt {
                    endpoint: endpoint.clone(),
                    credential,
                })
        })
        .collect()
}

impl<P: SessionProvider> DiscoveryContext<P> {
    async fn try_credential(&self, attempt: CredentialAttempt) -> Result<AttemptOutcome, TaskError> {
        let CredentialAttempt { endpoint, credential } = attempt;

        let mut session = open_session(
            self.provider.as_ref(),
            &endpoint,
            &credential,
            self.connect_timeout,
        )
        .await?;
        debug!(user = %credential.username, host = %endpoint, state = %ItemState::SessionOpen, "Authenticated");

        let probed = match &self.probe_command {
            Some(command) => {
                debug!(host = %endpoint, state = %ItemState::CommandPhase, "Running probe");
                self.runner.run(&mut session, command).await.map(|_| ())
            }
            None => Ok(()),
        };
        session.close().await;
        probed?;

        if self.dedup.try_claim(&endpoint.address, &credential) {
            info!(user = %credential.username, host = %endpoint, "Credential accepted");
            Ok(AttemptOutcome::Won(DiscoveryNotice {
                ip: endpoint.address,
                port: endpoint.port,
                credential,
            }))
        } else {
            debug!(user = %credential.username, host = %endpoint, "Host already claimed, discarding");
            Ok(AttemptOutcome::Duplicate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_attempts_flattens_requests() {
        let requests: Vec<DiscoveryRequest> = serde_json::from_str(
            r#"[
                {"ip": "10.0.0.1", "credentials": [
                    {"username": "admin", "password": "admin"},
                    {"username": "root", "password": "toor"}
                ]},
                {"ip": "10.0.0.2", "port": "2222", "credentials": [
                    {"username": "pi", "password": "raspberry"}
                ]},
                {"ip": "10.0.0.3"}
            ]"#,
        )
        .unwrap();

        let attempts = expand_attempts(requests);
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].label(), "admin@10.0.0.1:22");
        assert_eq!(attempts[2].endpoint.port, 2222);
    }
}
