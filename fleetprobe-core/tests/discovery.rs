//! Credential discovery against simulated hosts

use fleetprobe_core::aggregate::JsonLinesSink;
use fleetprobe_core::error::{CommandError, SessionError, TaskError};
use fleetprobe_core::{Credential, DispatchStrategy, Dispatcher, Discovery, DiscoveryNotice};
use fleetprobe_devkit::test_utils::init_test_logging;
use fleetprobe_devkit::{HostScript, SimulatedProvider, TestHarness};
use std::sync::Arc;
use std::time::Duration;

const CANDIDATES: &[(&str, &str)] = &[
    ("admin", "admin"),
    ("root", "root"),
    ("pi", "raspberry"),
    ("ubnt", "ubnt"),
    ("user", "user"),
];

#[tokio::test]
async fn test_simultaneous_successes_yield_one_notice() {
    init_test_logging();
    let provider = Arc::new(SimulatedProvider::new().host("10.0.0.1", HostScript::new()));
    let discovery = Discovery::new(provider.clone());

    let mut notices: Vec<DiscoveryNotice> = Vec::new();
    let report = discovery
        .discover(TestHarness::discovery_request("10.0.0.1", CANDIDATES), &mut notices)
        .await;

    assert_eq!(report.summary.total, 5);
    assert_eq!(report.summary.completed, 5);
    assert_eq!(notices.len(), 1);
    assert_eq!(report.duplicates, 4);
    assert_eq!(report.winners.len(), 1);
    assert_eq!(report.winners.get("10.0.0.1"), Some(&notices[0].credential));
    assert_eq!(provider.released(), 5);
}

#[tokio::test]
async fn test_only_accepted_credential_wins() {
    let provider = Arc::new(
        SimulatedProvider::new().host("10.0.0.1", HostScript::new().accept("pi", "raspberry")),
    );

    let mut notices: Vec<DiscoveryNotice> = Vec::new();
    let report = Discovery::new(provider.clone())
        .discover(TestHarness::discovery_request("10.0.0.1", CANDIDATES), &mut notices)
        .await;

    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].credential, Credential::new("pi", "raspberry"));
    assert_eq!(notices[0].ip, "10.0.0.1");
    assert_eq!(notices[0].port, 22);
    assert_eq!(report.duplicates, 0);
    assert_eq!(report.failures.len(), 4);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, TaskError::Session(SessionError::AuthRejected { .. }))));
}

#[tokio::test]
async fn test_two_accepted_credentials_one_winner() {
    let provider = Arc::new(
        SimulatedProvider::new().host(
            "10.0.0.1",
            HostScript::new()
                .accept("root", "root")
                .accept("user", "user"),
        ),
    );

    let mut notices: Vec<DiscoveryNotice> = Vec::new();
    let report = Discovery::new(provider)
        .discover(TestHarness::discovery_request("10.0.0.1", CANDIDATES), &mut notices)
        .await;

    assert_eq!(notices.len(), 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.failures.len(), 3);
    let winner = &notices[0].credential.username;
    assert!(winner == "root" || winner == "user");
}

#[tokio::test]
async fn test_probe_command_gates_the_win() {
    let provider = Arc::new(
        SimulatedProvider::new()
            .host(
                "10.0.0.1",
                HostScript::new()
                    .accept("admin", "admin")
                    .respond("whoami", "admin"),
            )
            // shell access denied after login
            .host(
                "10.0.0.2",
                HostScript::new()
                    .accept("admin", "admin")
                    .respond_with_status("whoami", "This account is currently not available.", 1),
            ),
    );
    let discovery = Discovery::new(provider.clone()).with_probe_command(Some("whoami".into()));

    let mut notices: Vec<DiscoveryNotice> = Vec::new();
    let report = discovery
        .discover_all(
            vec![
                TestHarness::discovery_request("10.0.0.1", &[("admin", "admin")]),
                TestHarness::discovery_request("10.0.0.2", &[("admin", "admin")]),
            ],
            &mut notices,
        )
        .await;

    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].ip, "10.0.0.1");
    assert!(matches!(
        report.failures[0].error,
        TaskError::Command(CommandError::Failed { .. })
    ));
    assert_eq!(provider.exec_count("10.0.0.1", "whoami"), 1);
    assert_eq!(provider.opened(), provider.released());
}

#[tokio::test]
async fn test_multiple_hosts_one_notice_each() {
    let provider = Arc::new(
        SimulatedProvider::new()
            .host("10.0.0.1", HostScript::new())
            .host("10.0.0.2", HostScript::new().accept("ubnt", "ubnt"))
            .host("10.0.0.3", HostScript::new().accept("nobody", "nothing")),
    );
    let discovery = Discovery::new(provider)
        .with_dispatcher(Dispatcher::new(DispatchStrategy::Bounded { workers: 4 }));

    let requests = ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
        .iter()
        .map(|ip| TestHarness::discovery_request(ip, CANDIDATES))
        .collect();

    let mut sink = JsonLinesSink::new(Vec::new());
    let report = discovery.discover_all(requests, &mut sink).await;

    assert_eq!(report.summary.total, 15);
    let lines = TestHarness::json_lines(&sink.into_inner()).unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|l| l["ip"] == "10.0.0.2" && l["credential"]["username"] == "ubnt"));
    assert!(lines.iter().all(|l| l["ip"] != "10.0.0.3"));
    assert_eq!(report.winners.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_fails_attempts() {
    let provider = Arc::new(
        SimulatedProvider::new().host("10.0.0.1", HostScript::new().hang_on_connect()),
    );
    let discovery =
        Discovery::new(provider).with_timeouts(Some(Duration::from_secs(3)), None);

    let mut notices: Vec<DiscoveryNotice> = Vec::new();
    let report = discovery
        .discover(TestHarness::discovery_request("10.0.0.1", CANDIDATES), &mut notices)
        .await;

    assert!(notices.is_empty());
    assert_eq!(report.failures.len(), 5);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, TaskError::Session(SessionError::Timeout { .. }))));
}

#[tokio::test]
async fn test_no_credentials_is_an_empty_batch() {
    let provider = Arc::new(SimulatedProvider::new().host("10.0.0.1", HostScript::new()));

    let mut notices: Vec<DiscoveryNotice> = Vec::new();
    let report = Discovery::new(provider.clone())
        .discover(TestHarness::discovery_request("10.0.0.1", &[]), &mut notices)
        .await;

    assert!(notices.is_empty());
    assert_eq!(report.summary.total, 0);
    assert_eq!(provider.connects(), 0);
}
