/*!
Test harness for fleetprobe pipelines

- Logging setup (env_logger) so core tracing shows up with RUST_LOG
- Builders for poll batches and discovery requests
- Scratch directory for config files
- Assertions on emitted records and NDJSON output
*/

use anyhow::{Context, Result};
use fleetprobe_core::models::{Credential, DiscoveryRequest, HostTarget, MetricRecord};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestHarness {
    workdir: TempDir,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        init_test_logging();
        let workdir = tempfile::tempdir().context("Failed to create scratch dir")?;
        Ok(Self { workdir })
    }

    /// Write `yaml` to a config file in the scratch dir
    pub fn write_config(&self, yaml: &str) -> Result<PathBuf> {
        let path = self.workdir.path().join("fleetprobe.yaml");
        std::fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote test config to {}", path.display());
        Ok(path)
    }

    /// Device `id` at `address`, logging in as root/root
    pub fn device(id: &str, address: &str) -> HostTarget {
        HostTarget {
            id: id.to_string(),
            address: address.to_string(),
            port: 22,
            credential: Credential::new("root", "root"),
        }
    }

    /// `count` devices named `dev-0..` at `10.0.0.1..`
    pub fn devices(count: usize) -> Vec<HostTarget> {
        (0..count)
            .map(|i| Self::device(&format!("dev-{}", i), &format!("10.0.0.{}", i + 1)))
            .collect()
    }

    pub fn discovery_request(address: &str, credentials: &[(&str, &str)]) -> DiscoveryRequest {
        DiscoveryRequest {
            address: address.to_string(),
            port: 22,
            credentials: credentials
                .iter()
                .map(|(user, pass)| Credential::new(*user, *pass))
                .collect(),
        }
    }

    /// Parse newline-delimited JSON
    pub fn json_lines(output: &[u8]) -> Result<Vec<Value>> {
        let text = std::str::from_utf8(output).context("Output is not UTF-8")?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).with_context(|| format!("Bad JSON line: {}", line)))
            .collect()
    }

    pub fn device_ids(records: &[MetricRecord]) -> BTreeSet<String> {
        records.iter().map(|r| r.device_id.clone()).collect()
    }

    /// Emitted records cover exactly `expected`, in any order
    pub fn assert_device_ids(records: &[MetricRecord], expected: &[&str]) -> Result<()> {
        let actual = Self::device_ids(records);
        let expected: BTreeSet<String> = expected.iter().map(|s| s.to_string()).collect();
        if actual != expected {
            anyhow::bail!("Device ids mismatch: expected {:?}, got {:?}", expected, actual);
        }
        log::info!("Records for {} devices as expected", actual.len());
        Ok(())
    }
}

/// Route `log` output (and core tracing via its `log` feature) to the test writer
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
