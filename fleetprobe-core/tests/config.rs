use fleetprobe_core::config::load_config_from;
use fleetprobe_core::{CommandSpec, DispatchStrategy, ParserRegistry, ProbeConfig};
use fleetprobe_devkit::TestHarness;
use std::time::Duration;

#[tokio::test]
async fn test_load_config_file() {
    let harness = TestHarness::new().unwrap();
    let path = harness
        .write_config(
            r#"
commands:
  - name: cpu
    command: top -b -n 1
    parser: cpu-idle
  - name: memory
    command: top -b -n 1
    parser: mem-used
dispatch:
  max_workers: 16
timeouts:
  connect_secs: 10
  command_secs: 30
ssh:
  keepalive_secs: 15
"#,
        )
        .unwrap();

    let cfg = load_config_from(&path).await;

    assert_eq!(cfg.commands.len(), 2);
    assert_eq!(cfg.strategy(), DispatchStrategy::Bounded { workers: 16 });
    assert_eq!(cfg.command_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(cfg.ssh.keepalive_secs, Some(15));
    assert_eq!(cfg.ssh.inactivity_timeout_secs, None);
    assert!(cfg.validate(&ParserRegistry::with_builtins()).is_ok());
}

#[tokio::test]
async fn test_broken_file_falls_back_to_defaults() {
    let harness = TestHarness::new().unwrap();
    let path = harness.write_config("commands: {{ nope").unwrap();

    let cfg = load_config_from(&path).await;

    assert_eq!(cfg, ProbeConfig::default());
    assert_eq!(cfg.commands, CommandSpec::default_set());
}
