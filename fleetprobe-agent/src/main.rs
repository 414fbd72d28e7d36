/**
 * FLEETPROBE AGENT - command-line entry point
 *
 * ROLE: decode one JSON batch, run the poller or credential discovery over SSH,
 * print one NDJSON line per successful item on stdout.
 *
 * USAGE: fleetprobe-agent <poller|discovery> <json|->
 * Diagnostics go to stderr (RUST_LOG, default fleetprobe=info).
 * Exit 2 on missing/malformed input, unknown event or invalid config.
 */

mod input;

use crate::input::{decode_discovery, decode_poll_batch, read_payload, Event, InputError};

use anyhow::{Context, Result};
use fleetprobe_core::session::ssh::SshSessionProvider;
use fleetprobe_core::{
    load_config, CancelSignal, Discovery, Dispatcher, JsonLinesSink, ParserRegistry, Poller,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fleetprobe=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(USAGE_ERROR)
        }
    }
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let event: Event = args.next().ok_or(InputError::Missing)?.parse()?;
    let payload = read_payload(args.next().as_deref()).await?;

    let cfg = load_config().await;
    let parsers = ParserRegistry::with_builtins();
    cfg.validate(&parsers).context("Invalid configuration")?;

    let provider = Arc::new(SshSessionProvider::new(&cfg.ssh));
    let (cancel, signal) = CancelSignal::new();
    let dispatcher = Dispatcher::new(cfg.strategy()).with_cancel(signal);
    info!(event = ?event, strategy = ?dispatcher.strategy(), "Batch accepted");

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight items");
            cancel.cancel();
        }
    });

    let mut sink = JsonLinesSink::new(std::io::stdout());

    match event {
        Event::Poller => {
            let devices = decode_poll_batch(&payload).context("Invalid poll batch")?;
            let report = Poller::new(provider, cfg.commands.clone(), parsers)
                .with_dispatcher(dispatcher)
                .with_timeouts(cfg.connect_timeout(), cfg.command_timeout())
                .poll(devices, &mut sink)
                .await;

            info!(
                total = report.summary.total,
                emitted = report.emitted,
                failed = report.failures.len(),
                elapsed_ms = report.summary.elapsed.as_millis() as u64,
                "processing complete"
            );
        }
        Event::Discovery => {
            let requests = decode_discovery(&payload).context("Invalid discovery request")?;
            let report = Discovery::new(provider)
                .with_dispatcher(dispatcher)
                .with_probe_command(cfg.discovery.probe_command.clone())
                .with_timeouts(cfg.connect_timeout(), cfg.command_timeout())
                .discover_all(requests, &mut sink)
                .await;

            info!(
                total = report.summary.total,
                hosts = report.winners.len(),
                duplicates = report.duplicates,
                failed = report.failures.len(),
                "processing complete"
            );
        }
    }

    Ok(())
}
