//! Result aggregation
//!
//! - `collect_outcomes` is the single consumer of the dispatcher's outcome
//!   channel: completed items go to a `RecordSink`, failed items are only logged
//! - `DedupMap` enforces "first success wins" per host for discovery, its lock
//!   covers the check-and-set and nothing else

use crate::dispatch::ItemOutcome;
use crate::error::{SinkError, TaskError};
use crate::models::Credential;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Destination for output records
pub trait RecordSink<R> {
    fn emit(&mut self, record: &R) -> Result<(), SinkError>;
}

impl<R: Clone> RecordSink<R> for Vec<R> {
    fn emit(&mut self, record: &R) -> Result<(), SinkError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Newline-delimited JSON, flushed per record
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write, R: Serialize> RecordSink<R> for JsonLinesSink<W> {
    fn emit(&mut self, record: &R) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// A work item that ended in `Failed`
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub index: usize,
    pub label: String,
    pub error: TaskError,
}

/// What the collector saw
#[derive(Debug, Default)]
pub struct Collection {
    /// Records accepted by the sink
    pub emitted: usize,
    /// Completed items that produced no record
    pub suppressed: usize,
    pub sink_errors: usize,
    pub failures: Vec<ItemFailure>,
}

/// Drain `outcomes` until every sender is gone
///
/// `to_record` decides whether a completed item yields an output record.
pub async fn collect_outcomes<T, R, S, M>(
    mut outcomes: mpsc::UnboundedReceiver<ItemOutcome<T>>,
    sink: &mut S,
    mut to_record: M,
) -> Collection
where
    S: RecordSink<R> + ?Sized,
    M: FnMut(T) -> Option<R>,
{
    let mut collection = Collection::default();

    while let Some(outcome) = outcomes.recv().await {
        match outcome.result {
            Ok(value) => match to_record(value) {
                Some(record) => match sink.emit(&record) {
                    Ok(()) => collection.emitted += 1,
                    Err(e) => {
                        error!(item = %outcome.label, "Failed to write record: {}", e);
                        collection.sink_errors += 1;
                    }
                },
                None => collection.suppressed += 1,
            },
            Err(e) => {
                warn!(
                    item = %outcome.label,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Item failed: {}",
                    e
                );
                collection.failures.push(ItemFailure {
                    index: outcome.index,
                    label: outcome.label,
                    error: e,
                });
            }
        }
    }

    collection
}

/// Host address -> first credential that got in
#[derive(Debug, Clone)]
pub struct DedupMap {
    winners: Shared<HashMap<String, Credential>>,
}

impl DedupMap {
    pub fn new() -> Self {
        Self {
            winners: new_state(HashMap::new()),
        }
    }

    /// Record `credential` for `host` unless someone already did.
    /// Returns true for the one caller that wins.
    pub fn try_claim(&self, host: &str, credential: &Credential) -> bool {
        match self.winners.lock().entry(host.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(credential.clone());
                true
            }
        }
    }

    pub fn winner(&self, host: &str) -> Option<Credential> {
        self.winners.lock().get(host).cloned()
    }

    pub fn len(&self) -> usize {
        self.winners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.lock().is_empty()
    }

    pub fn snapshot(&self) -> HashMap<String, Credential> {
        self.winners.lock().clone()
    }
}

impl Default for DedupMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::models::ItemState;
    use std::time::Duration;

    fn outcome(index: usize, result: Result<u32, TaskError>) -> ItemOutcome<u32> {
        ItemOutcome {
            index,
            label: format!("item-{index}"),
            state: if result.is_ok() { ItemState::Completed } else { ItemState::Failed },
            result,
            elapsed: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_failed_items_are_omitted_from_output() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(outcome(0, Ok(1))).unwrap();
        tx.send(outcome(
            1,
            Err(SessionError::AuthRejected {
                endpoint: "h:22".into(),
                username: "root".into(),
            }
            .into()),
        ))
        .unwrap();
        tx.send(outcome(2, Ok(3))).unwrap();
        drop(tx);

        let mut sink: Vec<u32> = Vec::new();
        let collection = collect_outcomes(rx, &mut sink, Some).await;

        assert_eq!(sink, vec![1, 3]);
        assert_eq!(collection.emitted, 2);
        assert_eq!(collection.failures.len(), 1);
        assert_eq!(collection.failures[0].label, "item-1");
    }

    #[tokio::test]
    async fn test_json_lines_output() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(outcome(0, Ok(7))).unwrap();
        tx.send(outcome(1, Ok(8))).unwrap();
        tx.send(outcome(2, Ok(9))).unwrap();
        drop(tx);

        let mut sink = JsonLinesSink::new(Vec::new());
        let collection = collect_outcomes(rx, &mut sink, |v| {
            (v != 8).then(|| serde_json::json!({ "value": v }))
        })
        .await;

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "{\"value\":7}\n{\"value\":9}\n");
        assert_eq!(collection.suppressed, 1);
    }

    /// Rejects one value, keeps the rest
    struct FlakySink {
        reject: u32,
        written: Vec<u32>,
    }

    impl RecordSink<u32> for FlakySink {
        fn emit(&mut self, record: &u32) -> Result<(), SinkError> {
            if *record == self.reject {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into());
            }
            self.written.push(*record);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_error_does_not_abort_batch() {
        let (tx, rx) = mpsc::unbounded_channel();
        for (index, value) in [4u32, 5, 6].into_iter().enumerate() {
            tx.send(outcome(index, Ok(value))).unwrap();
        }
        drop(tx);

        let mut sink = FlakySink {
            reject: 5,
            written: Vec::new(),
        };
        let collection = collect_outcomes(rx, &mut sink, Some).await;

        assert_eq!(collection.sink_errors, 1);
        assert_eq!(collection.emitted, 2);
        assert!(collection.failures.is_empty());
        assert_eq!(sink.written, vec![4, 6]);
    }

    #[test]
    fn test_first_claim_wins() {
        let map = DedupMap::new();
        assert!(map.is_empty());
        let first = Credential::new("admin", "admin");
        let second = Credential::new("root", "toor");

        assert!(map.try_claim("10.0.0.1", &first));
        assert!(!map.try_claim("10.0.0.1", &second));
        assert!(map.try_claim("10.0.0.2", &second));

        assert_eq!(map.winner("10.0.0.1"), Some(first));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let map = DedupMap::new();
        let barrier = Arc::new(std::sync::Barrier::new(5));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let map = map.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    map.try_claim("10.0.0.1", &Credential::new(format!("user{i}"), "pw"))
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(map.len(), 1);
    }
}
