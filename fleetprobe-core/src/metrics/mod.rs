//! Metric extraction for fleetprobe polls
//!
//! Turns raw diagnostic output into numbers:
//! - `CommandSpec` pairs a metric name with a command and a parser key
//! - `MetricParser` is the per-format strategy (pure, no I/O)
//! - `ParserRegistry` maps format keys to strategies
//!
//! A parse failure only ever degrades its own metric to "unavailable".

pub mod parsers;

use crate::error::ParseError;
use crate::models::MetricValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub use parsers::{CPU_IDLE, DISK_USED, MEM_USED, PERCENT, SWAP_USED};

/// One diagnostic to run on every polled device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Key in `MetricRecord::metrics`
    pub name: String,
    /// Literal command text sent to the host
    pub command: String,
    /// Parser key in the `ParserRegistry`
    pub parser: String,
}

impl CommandSpec {
    pub fn new(name: &str, command: &str, parser: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            parser: parser.to_string(),
        }
    }

    /// cpu / memory / disk from three separate tools
    pub fn default_set() -> Vec<Self> {
        vec![
            Self::new("cpu", "top -b -n 1", CPU_IDLE),
            Self::new("memory", "free", MEM_USED),
            Self::new("disk", "df -P", DISK_USED),
        ]
    }

    /// cpu / memory / swap from a single `top` run
    pub fn top_summary_set() -> Vec<Self> {
        vec![
            Self::new("cpu", "top -b -n 1", CPU_IDLE),
            Self::new("memory", "top -b -n 1", MEM_USED),
            Self::new("swap", "top -b -n 1", SWAP_USED),
        ]
    }
}

/// Reads one number out of raw command output
pub trait MetricParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<f64, ParseError>;
}

impl<F> MetricParser for F
where
    F: Fn(&str) -> Result<f64, ParseError> + Send + Sync,
{
    fn parse(&self, raw: &str) -> Result<f64, ParseError> {
        self(raw)
    }
}

/// Parsers keyed by output format
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn MetricParser>>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(CPU_IDLE, parsers::CpuIdleParser);
        registry.register(MEM_USED, parsers::UsageRowParser::memory());
        registry.register(SWAP_USED, parsers::UsageRowParser::swap());
        registry.register(DISK_USED, parsers::DiskUsageParser);
        registry.register(PERCENT, parsers::PercentParser);
        registry
    }

    /// Add or replace the parser for `key`
    pub fn register<P>(&mut self, key: &str, parser: P)
    where
        P: MetricParser + 'static,
    {
        if self.parsers.insert(key.to_string(), Arc::new(parser)).is_some() {
            debug!("Replaced parser for format: {}", key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.parsers.contains_key(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Parse `raw` for `metric`, degrading any failure to `Unavailable`
    pub fn evaluate(&self, metric: &str, key: &str, raw: &str) -> MetricValue {
        let Some(parser) = self.parsers.get(key) else {
            warn!(metric, parser = key, "no parser registered, metric unavailable");
            return MetricValue::Unavailable;
        };

        match parser.parse(raw) {
            Ok(value) => MetricValue::Value(value),
            Err(e) => {
                debug!(metric, parser = key, "metric unavailable: {}", e);
                MetricValue::Unavailable
            }
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_keys() {
        let registry = ParserRegistry::with_builtins();
        assert_eq!(
            registry.keys(),
            vec![CPU_IDLE, DISK_USED, MEM_USED, PERCENT, SWAP_USED]
        );
        for spec in CommandSpec::default_set() {
            assert!(registry.contains(&spec.parser));
        }
    }

    #[test]
    fn test_evaluate_degrades_instead_of_failing() {
        let registry = ParserRegistry::with_builtins();
        assert_eq!(
            registry.evaluate("cpu", CPU_IDLE, "%Cpu(s): 50.0 us, 15.0 sy, 0.0 ni, 35.0 id"),
            MetricValue::Value(65.0)
        );
        assert_eq!(
            registry.evaluate("cpu", CPU_IDLE, "segmentation fault"),
            MetricValue::Unavailable
        );
        assert_eq!(
            registry.evaluate("cpu", "no-such-format", "35.0"),
            MetricValue::Unavailable
        );
    }

    #[test]
    fn test_custom_format_registration() {
        let mut registry = ParserRegistry::empty();
        registry.register("load1", |raw: &str| {
            parsers::parse_number("load1", raw.split_whitespace().next().unwrap_or(""))
        });
        assert_eq!(
            registry.evaluate("load", "load1", "0.42 0.30 0.25 1/345 9876"),
            MetricValue::Value(0.42)
        );
    }

    #[test]
    fn test_top_summary_set_shares_one_command() {
        let set = CommandSpec::top_summary_set();
        assert!(set.iter().all(|spec| spec.command == set[0].command));
    }
}
