//! Device polling pipeline
//!
//! For every `HostTarget` in a batch: open a session, run the configured
//! diagnostics, parse each output into a metric and emit one `MetricRecord`.
//! Session or command failure drops the device from the output, a parse
//! failure only marks that metric "unavailable".

use crate::aggregate::{collect_outcomes, ItemFailure, RecordSink};
use crate::dispatch::{DispatchSummary, Dispatcher, ItemOutcome, WorkItem};
use crate::error::{CommandError, TaskError};
use crate::execution::CommandRunner;
use crate::metrics::{CommandSpec, ParserRegistry};
use crate::models::{HostTarget, ItemState, MetricRecord, MetricValue};
use crate::session::{open_session, RemoteSession, SessionProvider};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

impl WorkItem for HostTarget {
    fn label(&self) -> String {
        format!("{} ({})", self.id, self.address)
    }
}

/// Result of one poll batch
#[derive(Debug)]
pub struct PollReport {
    pub summary: DispatchSummary,
    pub emitted: usize,
    pub sink_errors: usize,
    pub failures: Vec<ItemFailure>,
}

struct PollContext<P> {
    provider: Arc<P>,
    specs: Vec<CommandSpec>,
    parsers: ParserRegistry,
    runner: CommandRunner,
    connect_timeout: Option<Duration>,
}

/// Polls batches of devices concurrently
pub struct Poller<P> {
    ctx: Arc<PollContext<P>>,
    dispatcher: Dispatcher,
}

impl<P: SessionProvider> Poller<P> {
    pub fn new(provider: Arc<P>, specs: Vec<CommandSpec>, parsers: ParserRegistry) -> Self {
        Self {
            ctx: Arc::new(PollContext {
                provider,
                specs,
                parsers,
                runner: CommandRunner::default(),
                connect_timeout: None,
            }),
            dispatcher: Dispatcher::default(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Bound session setup and each command run
    pub fn with_timeouts(mut self, connect: Option<Duration>, command: Option<Duration>) -> Self {
        if let Some(ctx) = Arc::get_mut(&mut self.ctx) {
            ctx.connect_timeout = connect;
            ctx.runner = CommandRunner::new(command);
        }
        self
    }

    /// Poll every device and write one record per completed device to `sink`
    pub async fn poll<S>(&self, devices: Vec<HostTarget>, sink: &mut S) -> PollReport
    where
        S: RecordSink<MetricRecord> + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("poll", run = %run_id, devices = devices.len());

        async {
            let (tx, rx) = mpsc::unbounded_channel::<ItemOutcome<MetricRecord>>();
            let ctx = self.ctx.clone();
            let work = move |target: HostTarget| {
                let ctx = ctx.clone();
                async move { ctx.poll_device(target).await }
            };

            let (summary, collection) = tokio::join!(
                self.dispatcher.run(devices, work, tx),
                collect_outcomes(rx, sink, Some)
            );

            info!(
                emitted = collection.emitted,
                failed = collection.failures.len(),
                "Poll complete"
            );
            PollReport {
                summary,
                emitted: collection.emitted,
                sink_errors: collection.sink_errors,
                failures: collection.failures,
            }
        }
        .instrument(span)
        .await
    }
}

impl<P: SessionProvider> PollContext<P> {
    async fn poll_device(&self, target: HostTarget) -> Result<MetricRecord, TaskError> {
        debug!(device = %target.id, state = %ItemState::Pending, "Connecting to device");

        let mut session = open_session(
            self.provider.as_ref(),
            &target.endpoint(),
            &target.credential,
            self.connect_timeout,
        )
        .await?;
        debug!(device = %target.id, state = %ItemState::SessionOpen, "Session open");

        let collected = self.collect_metrics(&mut session, &target).await;
        session.close().await;
        let metrics = collected?;

        debug!(device = %target.id, state = %ItemState::Completed, "Metrics collected");
        Ok(MetricRecord::new(target.id, target.address, metrics))
    }

    /// Run every diagnostic, sharing output between specs that use the same command
    async fn collect_metrics<S: RemoteSession>(
        &self,
        session: &mut S,
        target: &HostTarget,
    ) -> Result<BTreeMap<String, MetricValue>, CommandError> {
        let mut outputs: HashMap<&str, String> = HashMap::new();
        let mut metrics = BTreeMap::new();
        let mut command_ms = 0u128;

        for spec in &self.specs {
            if !outputs.contains_key(spec.command.as_str()) {
                debug!(device = %target.id, state = %ItemState::CommandPhase, metric = %spec.name, "Running diagnostic");
                let result = self.runner.run(session, &spec.command).await?;
                command_ms += result.execution_time_ms;
                outputs.insert(spec.command.as_str(), result.output);
            }

            let raw = outputs
                .get(spec.command.as_str())
                .map(String::as_str)
                .unwrap_or_default();
            let value = self.parsers.evaluate(&spec.name, &spec.parser, raw);
            metrics.insert(spec.name.clone(), value);
        }

        debug!(
            device = %target.id,
            command_ms = command_ms as u64,
            unavailable = metrics.values().filter(|v| !v.is_available()).count(),
            "Diagnostics finished"
        );
        Ok(metrics)
    }
}
