//! Input batches and output records
//!
//! Field names follow the JSON batches handed over by the scheduler
//! (`_id`, `ip`, `credentials`, ...). Inputs are read-only once decoded,
//! outputs are built once and never mutated.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

const DEFAULT_SSH_PORT: u16 = 22;

/// Username / secret pair
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Secrets stay out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Network location of a host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// One device to poll
#[derive(Debug, Clone, Deserialize)]
pub struct HostTarget {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "ip", alias = "address")]
    pub address: String,
    #[serde(default = "default_port", deserialize_with = "de_port")]
    pub port: u16,
    #[serde(rename = "credentials", alias = "credential")]
    pub credential: Credential,
}

impl HostTarget {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            address: self.address.clone(),
            port: self.port,
        }
    }
}

/// One host and the credentials to race against it
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryRequest {
    #[serde(rename = "ip", alias = "address")]
    pub address: String,
    #[serde(default = "default_port", deserialize_with = "de_port")]
    pub port: u16,
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

impl DiscoveryRequest {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            address: self.address.clone(),
            port: self.port,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Ports arrive as numbers or as numeric strings depending on the producer
fn de_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(port) => Ok(port),
        PortRepr::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{text}'"))),
    }
}

/// A single metric value, or the "unavailable" sentinel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Value(f64),
    Unavailable,
}

pub const UNAVAILABLE: &str = "unavailable";

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(*v),
            MetricValue::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, MetricValue::Value(_))
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_f64() {
            Some(v) => serializer.serialize_f64(v),
            None => serializer.serialize_str(UNAVAILABLE),
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(MetricValue::Value(v)),
            Repr::Text(t) if t == UNAVAILABLE => Ok(MetricValue::Unavailable),
            Repr::Text(t) => Err(serde::de::Error::custom(format!("unexpected metric value '{t}'"))),
        }
    }
}

/// Metrics captured from one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub device_id: String,
    pub ip: String,
    pub metrics: BTreeMap<String, MetricValue>,
    /// Milliseconds since epoch
    pub timestamp: i64,
}

impl MetricRecord {
    pub fn new(device_id: String, ip: String, metrics: BTreeMap<String, MetricValue>) -> Self {
        Self {
            device_id,
            ip,
            metrics,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn value(&self, name: &str) -> Option<MetricValue> {
        self.metrics.get(name).copied()
    }
}

/// First working credential found for a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryNotice {
    pub ip: String,
    pub port: u16,
    pub credential: Credential,
}

/// Lifecycle of a work item
///
/// `Pending -> SessionOpen -> CommandPhase* -> Completed`, any state may
/// move to `Failed`. Both terminal states are final, there is no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    SessionOpen,
    CommandPhase,
    Completed,
    Failed,
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Completed | ItemState::Failed)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemState::Pending => "pending",
            ItemState::SessionOpen => "session_open",
            ItemState::CommandPhase => "command_phase",
            ItemState::Completed => "completed",
            ItemState::Failed => "failed",
        };
        f.write_str(s)
    }
}
