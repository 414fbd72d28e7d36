//! fleetprobe core - concurrent remote fan-out over SSH
//!
//! Two pipelines share one engine:
//! - `poller`: per-device session, diagnostics, parsed metrics, one record per device
//! - `discovery`: race candidate credentials per host, first success wins
//!
//! Both dispatch work items through `dispatch::Dispatcher` (join barrier,
//! per-item isolation) and hand outcomes to `aggregate` over a channel.
//! Remote access goes through the `session::SessionProvider` trait; the
//! `ssh` feature provides the `russh` implementation.

pub mod aggregate;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod execution;
pub mod metrics;
pub mod models;
pub mod poller;
pub mod session;

pub use aggregate::{DedupMap, JsonLinesSink, RecordSink};
pub use config::{load_config, ProbeConfig};
pub use discovery::{Discovery, DiscoveryReport};
pub use dispatch::{CancelHandle, CancelSignal, DispatchStrategy, Dispatcher};
pub use error::{CommandError, ConfigError, ParseError, SessionError, SinkError, TaskError};
pub use metrics::{CommandSpec, MetricParser, ParserRegistry};
pub use models::{Credential, DiscoveryNotice, DiscoveryRequest, HostTarget, MetricRecord, MetricValue};
pub use poller::{PollReport, Poller};
pub use session::{CommandOutput, RemoteSession, SessionProvider};
