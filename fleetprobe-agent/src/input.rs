//! Command-line event and JSON payload decoding

use fleetprobe_core::models::{DiscoveryRequest, HostTarget};
use std::str::FromStr;
use tokio::io::AsyncReadExt;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("usage: fleetprobe-agent <poller|discovery> <json|->")]
    Missing,
    #[error("unknown event '{0}', expected 'poller' or 'discovery'")]
    UnknownEvent(String),
    #[error("malformed input: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("cannot read stdin: {0}")]
    Stdin(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Poller,
    Discovery,
}

impl FromStr for Event {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poller" => Ok(Event::Poller),
            "discovery" => Ok(Event::Discovery),
            other => Err(InputError::UnknownEvent(other.to_string())),
        }
    }
}

/// Payload from the argument itself, or from stdin when it is `-`
pub async fn read_payload(arg: Option<&str>) -> Result<String, InputError> {
    let payload = match arg {
        Some("-") => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            text
        }
        Some(text) => text.to_string(),
        None => return Err(InputError::Missing),
    };

    if payload.trim().is_empty() {
        return Err(InputError::Missing);
    }
    Ok(payload)
}

pub fn decode_poll_batch(payload: &str) -> Result<Vec<HostTarget>, InputError> {
    Ok(serde_json::from_str(payload)?)
}

/// A single request object or an array of them
pub fn decode_discovery(payload: &str) -> Result<Vec<DiscoveryRequest>, InputError> {
    if payload.trim_start().starts_with('[') {
        Ok(serde_json::from_str(payload)?)
    } else {
        Ok(vec![serde_json::from_str(payload)?])
    }
}
