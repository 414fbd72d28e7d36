/*!
Simulated SSH hosts behind the `SessionProvider` seam

Each host address gets a `HostScript`: which credentials it accepts, how long
the handshake takes, and what every command prints. The provider counts
connects, opened and released sessions and every command it ran, so tests can
check that sessions are released on all paths.
*/

use async_trait::async_trait;
use fleetprobe_core::error::{CommandError, SessionError};
use fleetprobe_core::models::{Credential, Endpoint};
use fleetprobe_core::session::{CommandOutput, RemoteSession, SessionProvider};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::fixtures;

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    Fail(CommandError),
    Hang,
}

#[derive(Debug, Clone)]
struct ScriptedCommand {
    reply: Reply,
    delay: Duration,
}

/// Behavior of one simulated host
#[derive(Debug, Clone, Default)]
pub struct HostScript {
    /// `None` accepts every credential
    accepted: Option<HashSet<Credential>>,
    connect_delay: Duration,
    refuse: Option<String>,
    hang_on_connect: bool,
    commands: HashMap<String, ScriptedCommand>,
}

impl HostScript {
    /// Accepts any credential, knows no commands
    pub fn new() -> Self {
        Self::default()
    }

    /// A Linux box answering the default cpu/memory/disk commands
    /// (CPU 65.0, memory 25.0, disk 37.0)
    pub fn healthy() -> Self {
        Self::new()
            .respond("top -b -n 1", fixtures::TOP_PROCPS_NG)
            .respond("free", fixtures::FREE_PROCPS_NG)
            .respond("df -P", fixtures::DF_TOTAL)
    }

    /// Only accept this credential (call again to accept more)
    pub fn accept(mut self, username: &str, password: &str) -> Self {
        self.accepted
            .get_or_insert_with(HashSet::new)
            .insert(Credential::new(username, password));
        self
    }

    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Fail the connection (after `connect_delay`)
    pub fn refuse(mut self, reason: &str) -> Self {
        self.refuse = Some(reason.to_string());
        self
    }

    /// Never finish the handshake
    pub fn hang_on_connect(mut self) -> Self {
        self.hang_on_connect = true;
        self
    }

    pub fn respond(self, command: &str, output: &str) -> Self {
        self.script(command, Reply::Output(CommandOutput::success(output)), Duration::ZERO)
    }

    pub fn respond_after(self, command: &str, output: &str, delay: Duration) -> Self {
        self.script(command, Reply::Output(CommandOutput::success(output)), delay)
    }

    pub fn respond_with_status(self, command: &str, output: &str, status: u32) -> Self {
        let reply = Reply::Output(CommandOutput {
            text: output.to_string(),
            exit_status: Some(status),
        });
        self.script(command, reply, Duration::ZERO)
    }

    /// Channel-level failure while running `command`
    pub fn fail(self, command: &str, reason: &str) -> Self {
        let reply = Reply::Fail(CommandError::Failed {
            command: command.to_string(),
            reason: reason.to_string(),
        });
        self.script(command, reply, Duration::ZERO)
    }

    pub fn fail_after(self, command: &str, reason: &str, delay: Duration) -> Self {
        let reply = Reply::Fail(CommandError::Failed {
            command: command.to_string(),
            reason: reason.to_string(),
        });
        self.script(command, reply, delay)
    }

    /// `command` never returns
    pub fn hang(self, command: &str) -> Self {
        self.script(command, Reply::Hang, Duration::ZERO)
    }

    fn script(mut self, command: &str, reply: Reply, delay: Duration) -> Self {
        self.commands
            .insert(command.to_string(), ScriptedCommand { reply, delay });
        self
    }

    fn accepts(&self, credential: &Credential) -> bool {
        self.accepted
            .as_ref()
            .map_or(true, |accepted| accepted.contains(credential))
    }
}

#[derive(Debug, Default)]
struct Stats {
    connects: AtomicUsize,
    opened: AtomicUsize,
    released: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    execs: Mutex<Vec<(String, String)>>,
}

/// `SessionProvider` over scripted hosts, keyed by address
#[derive(Debug, Default)]
pub struct SimulatedProvider {
    hosts: HashMap<String, Arc<HostScript>>,
    stats: Arc<Stats>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, address: &str, script: HostScript) -> Self {
        self.hosts.insert(address.to_string(), Arc::new(script));
        self
    }

    /// Handshakes attempted, including failed ones
    pub fn connects(&self) -> usize {
        self.stats.connects.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.stats.released.load(Ordering::SeqCst)
    }

    /// Sessions open right now
    pub fn live(&self) -> usize {
        self.stats.live.load(Ordering::SeqCst)
    }

    /// Most sessions ever open at the same time
    pub fn peak_live(&self) -> usize {
        self.stats.peak_live.load(Ordering::SeqCst)
    }

    /// How many times `command` ran on `address`
    pub fn exec_count(&self, address: &str, command: &str) -> usize {
        self.stats
            .execs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(host, cmd)| host == address && cmd == command)
            .count()
    }
}

#[async_trait]
impl SessionProvider for SimulatedProvider {
    type Session = SimulatedSession;

    async fn open(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
    ) -> Result<Self::Session, SessionError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);

        let Some(script) = self.hosts.get(&endpoint.address).cloned() else {
            return Err(SessionError::Connect {
                endpoint: endpoint.to_string(),
                reason: "no route to host".into(),
            });
        };

        if !script.connect_delay.is_zero() {
            tokio::time::sleep(script.connect_delay).await;
        }
        if script.hang_on_connect {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = &script.refuse {
            return Err(SessionError::Connect {
                endpoint: endpoint.to_string(),
                reason: reason.clone(),
            });
        }
        if !script.accepts(credential) {
            log::debug!("[sim] {} rejected {}", endpoint, credential.username);
            return Err(SessionError::AuthRejected {
                endpoint: endpoint.to_string(),
                username: credential.username.clone(),
            });
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_live.fetch_max(live, Ordering::SeqCst);
        log::debug!("[sim] session open on {} as {}", endpoint, credential.username);

        Ok(SimulatedSession {
            address: endpoint.address.clone(),
            script,
            stats: self.stats.clone(),
            released: false,
        })
    }
}

/// Session on a scripted host. Dropping it without `close` still counts as released.
#[derive(Debug)]
pub struct SimulatedSession {
    address: String,
    script: Arc<HostScript>,
    stats: Arc<Stats>,
    released: bool,
}

impl SimulatedSession {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.released.fetch_add(1, Ordering::SeqCst);
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RemoteSession for SimulatedSession {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, CommandError> {
        if self.released {
            return Err(CommandError::Channel("session already closed".into()));
        }

        self.stats
            .execs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((self.address.clone(), command.to_string()));

        let Some(scripted) = self.script.commands.get(command).cloned() else {
            return Ok(CommandOutput {
                text: format!("sh: {}: not found", command),
                exit_status: Some(127),
            });
        };

        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }

        match scripted.reply {
            Reply::Output(output) => Ok(output),
            Reply::Fail(e) => Err(e),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        self.release();
    }
}
