//! Concurrent dispatch of independent work items
//!
//! Every item runs in its own task (or on a pool worker when bounded), reports
//! exactly one `ItemOutcome` and never affects its siblings: errors, panics and
//! cancellation are all recorded against the item alone. `Dispatcher::run`
//! returns only once every item has reported (join barrier).
//!
//! Without timeouts or cancellation, an item stuck in a network call holds the
//! barrier forever. `CancelHandle::cancel` is the way out.

use crate::error::TaskError;
use crate::models::ItemState;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Queue slots per worker in bounded mode
const QUEUE_DEPTH_PER_WORKER: usize = 2;

/// How items are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchStrategy {
    /// One task per item, all launched at once
    #[default]
    Unbounded,
    /// Fixed pool of persistent workers fed by a bounded queue
    Bounded { workers: usize },
}

impl DispatchStrategy {
    /// `None` or `Some(0)` mean no bound
    pub fn from_max_workers(max_workers: Option<usize>) -> Self {
        match max_workers {
            Some(workers) if workers > 0 => DispatchStrategy::Bounded { workers },
            _ => DispatchStrategy::Unbounded,
        }
    }
}

/// Something the dispatcher can name in logs and reports
pub trait WorkItem {
    fn label(&self) -> String;
}

/// Raises the stop flag for every in-flight item
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cooperative stop flag observed by in-flight items
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (handle, signal) = Self::new();
        // dropping the sender freezes the flag at false
        drop(handle);
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested, never if it can't be anymore
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

/// Terminal report for one item
#[derive(Debug)]
pub struct ItemOutcome<T> {
    /// Position in the input batch
    pub index: usize,
    pub label: String,
    pub state: ItemState,
    pub result: Result<T, TaskError>,
    pub elapsed: Duration,
}

impl<T> ItemOutcome<T> {
    fn new(index: usize, label: String, result: Result<T, TaskError>, elapsed: Duration) -> Self {
        let state = if result.is_ok() {
            ItemState::Completed
        } else {
            ItemState::Failed
        };
        Self {
            index,
            label,
            state,
            result,
            elapsed,
        }
    }
}

/// Counts for a finished dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl DispatchSummary {
    fn tally(total: usize, states: impl IntoIterator<Item = ItemState>, elapsed: Duration) -> Self {
        let completed = states
            .into_iter()
            .filter(|s| *s == ItemState::Completed)
            .count();
        Self {
            total,
            completed,
            failed: total - completed,
            elapsed,
        }
    }
}

/// Runs batches of independent items concurrently
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    strategy: DispatchStrategy,
    cancel: CancelSignal,
}

impl Dispatcher {
    pub fn new(strategy: DispatchStrategy) -> Self {
        Self {
            strategy,
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    /// Run `work` over every item and send each outcome to `outcomes` as it
    /// completes. Returns after the last item has reported.
    pub async fn run<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        work: F,
        outcomes: mpsc::UnboundedSender<ItemOutcome<T>>,
    ) -> DispatchSummary
    where
        I: WorkItem + Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let total = items.len();
        if total == 0 {
            debug!("Empty batch, nothing to dispatch");
            return DispatchSummary::default();
        }

        let start = Instant::now();
        let work = Arc::new(work);
        info!(items = total, strategy = ?self.strategy, "Dispatching batch");

        let states = match self.strategy {
            DispatchStrategy::Unbounded => self.run_unbounded(items, work, outcomes).await,
            DispatchStrategy::Bounded { workers } => {
                self.run_bounded(items, work, outcomes, workers).await
            }
        };

        let summary = DispatchSummary::tally(total, states, start.elapsed());
        info!(
            completed = summary.completed,
            failed = summary.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "All items reached a terminal state"
        );
        summary
    }

    async fn run_unbounded<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        work: Arc<F>,
        outcomes: mpsc::UnboundedSender<ItemOutcome<T>>,
    ) -> Vec<ItemState>
    where
        I: WorkItem + Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let handles: Vec<_> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let work = work.clone();
                let cancel = self.cancel.clone();
                let outcomes = outcomes.clone();
                tokio::spawn(async move {
                    let outcome = execute(index, item, work.as_ref(), cancel).await;
                    let state = outcome.state;
                    let _ = outcomes.send(outcome);
                    state
                })
            })
            .collect();
        drop(outcomes);

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    error!("Dispatch task lost: {}", e);
                    ItemState::Failed
                })
            })
            .collect()
    }

    async fn run_bounded<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        work: Arc<F>,
        outcomes: mpsc::UnboundedSender<ItemOutcome<T>>,
        workers: usize,
    ) -> Vec<ItemState>
    where
        I: WorkItem + Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let total = items.len();
        let workers = workers.clamp(1, total);
        let (queue_tx, queue_rx) = mpsc::channel::<(usize, I)>(workers * QUEUE_DEPTH_PER_WORKER);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let queue_rx = queue_rx.clone();
                let work = work.clone();
                let cancel = self.cancel.clone();
                let outcomes = outcomes.clone();
                tokio::spawn(async move {
                    let mut states = Vec::new();
                    loop {
                        let next = queue_rx.lock().await.recv().await;
                        let Some((index, item)) = next else { break };
                        let outcome = execute(index, item, work.as_ref(), cancel.clone()).await;
                        states.push(outcome.state);
                        let _ = outcomes.send(outcome);
                    }
                    debug!(worker_id, handled = states.len(), "Worker drained queue");
                    states
                })
            })
            .collect();
        drop(outcomes);

        for entry in items.into_iter().enumerate() {
            if queue_tx.send(entry).await.is_err() {
                error!("All workers exited before the queue was drained");
                break;
            }
        }
        drop(queue_tx);

        let mut states: Vec<ItemState> = Vec::with_capacity(total);
        for joined in join_all(handles).await {
            match joined {
                Ok(worker_states) => states.extend(worker_states),
                Err(e) => error!("Worker lost: {}", e),
            }
        }
        // items a lost worker never reported count as failed
        states.resize(total, ItemState::Failed);
        states
    }
}

/// Run one item to its terminal state
async fn execute<I, T, F, Fut>(
    index: usize,
    item: I,
    work: &F,
    mut cancel: CancelSignal,
) -> ItemOutcome<T>
where
    I: WorkItem,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let label = item.label();
    let start = Instant::now();
    debug!(item = %label, state = %ItemState::Pending, "Item started");

    let guarded = AssertUnwindSafe(work(item)).catch_unwind();
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TaskError::Cancelled),
        caught = guarded => caught.unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic)))),
    };

    let outcome = ItemOutcome::new(index, label, result, start.elapsed());
    debug!(
        item = %outcome.label,
        state = %outcome.state,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "Item finished"
    );
    outcome
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    struct Job {
        name: &'static str,
        delay_ms: u64,
        fail: bool,
    }

    impl WorkItem for Job {
        fn label(&self) -> String {
            self.name.to_string()
        }
    }

    fn job(name: &'static str, delay_ms: u64, fail: bool) -> Job {
        Job { name, delay_ms, fail }
    }

    async fn perform(job: Job) -> Result<&'static str, TaskError> {
        tokio::time::sleep(Duration::from_millis(job.delay_ms)).await;
        if job.fail {
            Err(SessionError::Connect {
                endpoint: job.name.to_string(),
                reason: "connection refused".to_string(),
            }
            .into())
        } else {
            Ok(job.name)
        }
    }

    async fn collect<T>(mut rx: mpsc::UnboundedReceiver<ItemOutcome<T>>) -> Vec<ItemOutcome<T>> {
        let mut all = Vec::new();
        while let Some(outcome) = rx.recv().await {
            all.push(outcome);
        }
        all
    }

    #[tokio::test]
    async fn test_empty_batch_returns_immediately() {
        let (tx, rx) = mpsc::unbounded_channel();
        let summary = Dispatcher::default().run(Vec::<Job>::new(), perform, tx).await;
        assert_eq!(summary, DispatchSummary::default());
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_item_reports_before_return() {
        let jobs = vec![job("a", 30, false), job("b", 10, true), job("c", 20, false)];
        let (tx, rx) = mpsc::unbounded_channel();

        let summary = Dispatcher::default().run(jobs, perform, tx).await;
        let outcomes = collect(rx).await;

        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.state.is_terminal()));

        let indexes: HashSet<usize> = outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indexes, HashSet::from([0, 1, 2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_run_concurrently() {
        let jobs: Vec<Job> = (0..10).map(|_| job("n", 100, false)).collect();
        let (tx, _rx) = mpsc::unbounded_channel();

        let summary = Dispatcher::default().run(jobs, perform, tx).await;
        assert_eq!(summary.completed, 10);
        assert!(summary.elapsed < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let jobs = vec![job("ok", 0, false), job("boom", 0, false)];
        let (tx, rx) = mpsc::unbounded_channel();

        let summary = Dispatcher::default()
            .run(
                jobs,
                |job: Job| async move {
                    if job.name == "boom" {
                        panic!("parser exploded");
                    }
                    Ok::<_, TaskError>(job.name)
                },
                tx,
            )
            .await;

        assert_eq!(summary.completed, 1);
        let outcomes = collect(rx).await;
        let boom = outcomes.iter().find(|o| o.label == "boom").unwrap();
        assert!(matches!(&boom.result, Err(TaskError::Panicked(msg)) if msg.contains("parser exploded")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_pool_limits_parallelism() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<Job> = (0..12).map(|_| job("w", 50, false)).collect();
        let (tx, rx) = mpsc::unbounded_channel();

        let work = {
            let running = running.clone();
            let peak = peak.clone();
            move |job: Job| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    let result = perform(job).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    result
                }
            }
        };

        let summary = Dispatcher::new(DispatchStrategy::Bounded { workers: 3 })
            .run(jobs, work, tx)
            .await;

        assert_eq!(summary.completed, 12);
        assert_eq!(collect(rx).await.len(), 12);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_terminates_stuck_items() {
        let (handle, signal) = CancelSignal::new();
        let jobs = vec![job("fast", 10, false), job("stuck", 3_600_000, false)];
        let (tx, rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher::default().with_cancel(signal);
        let run = dispatcher.run(jobs, perform, tx);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.cancel();
        };
        let (summary, _) = tokio::join!(run, cancel);

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        let outcomes = collect(rx).await;
        let stuck = outcomes.iter().find(|o| o.label == "stuck").unwrap();
        assert!(matches!(stuck.result, Err(TaskError::Cancelled)));
    }

    #[test]
    fn test_strategy_from_config() {
        assert_eq!(DispatchStrategy::from_max_workers(None), DispatchStrategy::Unbounded);
        assert_eq!(DispatchStrategy::from_max_workers(Some(0)), DispatchStrategy::Unbounded);
        assert_eq!(
            DispatchStrategy::from_max_workers(Some(4)),
            DispatchStrategy::Bounded { workers: 4 }
        );

        assert_eq!(Dispatcher::default().strategy(), DispatchStrategy::Unbounded);
        let bounded = Dispatcher::new(DispatchStrategy::from_max_workers(Some(8)));
        assert_eq!(bounded.strategy(), DispatchStrategy::Bounded { workers: 8 });
    }
}
