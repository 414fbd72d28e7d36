//! Error taxonomy for remote work items
//!
//! Three layers, each with its own blast radius:
//! - `SessionError` aborts the item (no session, nothing to run)
//! - `CommandError` aborts the item's remaining phases
//! - `ParseError` degrades a single metric to "unavailable"
//!
//! None of them ever reaches a sibling item or the dispatcher itself.

use std::time::Duration;

/// Could not establish or authenticate a session to a host
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("authentication rejected for {username}@{endpoint}")]
    AuthRejected { endpoint: String, username: String },
    #[error("session to {endpoint} not established within {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },
}

/// Session is up but a command did not run to a usable result
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    #[error("could not open channel: {0}")]
    Channel(String),
    #[error("command '{command}' failed: {reason}")]
    Failed { command: String, reason: String },
    #[error("command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

/// Output was received but one metric could not be read from it
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("no line matching '{0}' in output")]
    MissingLine(&'static str),
    #[error("field '{field}' is not a number: '{raw}'")]
    NotANumber { field: &'static str, raw: String },
    #[error("total for '{0}' is zero")]
    ZeroTotal(&'static str),
    #[error("empty output")]
    Empty,
}

/// Terminal failure of one work item, as recorded by the dispatcher
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("cancelled before completion")]
    Cancelled,
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Invalid `ProbeConfig`
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no commands configured")]
    NoCommands,
    #[error("metric name '{0}' is configured twice")]
    DuplicateMetric(String),
    #[error("metric '{metric}' uses unknown parser '{parser}'")]
    UnknownParser { metric: String, parser: String },
    #[error("dispatch.max_workers must be greater than zero")]
    ZeroWorkers,
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Output sink could not take a record
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
