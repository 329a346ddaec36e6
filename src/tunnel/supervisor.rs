use crate::tunnel::classify::{classify, OutputClass};
use crate::tunnel::command::{build_ssh_args, display_command};
use crate::tunnel::model::{
    ConnectionState, ForwardMapping, PortStatus, ReconnectPolicy, SshOptions, TunnelCommand,
    TunnelConfig, TunnelEvent,
};
use crate::tunnel::probe::probe;
use log::{debug, error, info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant, Interval};
use tokio_util::sync::CancellationToken;

const STOP_GRACE: Duration = Duration::from_secs(3);
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug)]
enum ChunkKind {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct OutputChunk {
    kind: ChunkKind,
    text: String,
}

#[derive(Debug)]
struct ProbeResult {
    port: u16,
    label: String,
    open: bool,
}

/// Caller facade over the supervisor task. Cheap to clone; every method goes
/// through the actor's command channel, so state transitions stay serialized.
#[derive(Clone)]
pub struct TunnelHandle {
    cmd_tx: mpsc::Sender<TunnelCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    event_tx: broadcast::Sender<TunnelEvent>,
    shutdown: CancellationToken,
}

impl TunnelHandle {
    /// Spawn a supervisor task and return its handle.
    pub fn spawn(options: SshOptions) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (event_tx, _) = broadcast::channel(256);
        let (probe_tx, probe_rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();

        let actor = TunnelSupervisor {
            options,
            cmd_rx,
            state_tx,
            event_tx: event_tx.clone(),
            shutdown: shutdown.clone(),
            probe_tx,
            probe_rx,
            child: None,
            chunk_rx: None,
            last_config: None,
            policy: ReconnectPolicy::default(),
            reconnect_at: None,
            ticker: None,
            monitored: Vec::new(),
            port_status: HashMap::new(),
        };
        tokio::spawn(actor.run());

        Self {
            cmd_tx,
            state_rx,
            event_tx,
            shutdown,
        }
    }

    /// Validate and launch a tunnel. `false` means the config was rejected or
    /// the process could not be spawned; a tunnel already active is stopped
    /// first. A caller-issued start always begins a fresh retry budget.
    pub async fn start(&self, config: TunnelConfig) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(TunnelCommand::Start { config, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Stop the active tunnel, cancelling any pending reconnect. `false` when
    /// there was nothing to stop.
    pub async fn stop(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(TunnelCommand::Stop { reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn set_auto_reconnect(&self, enabled: bool, max_attempts: u32) {
        let _ = self
            .cmd_tx
            .send(TunnelCommand::SetAutoReconnect {
                enabled,
                max_attempts,
            })
            .await;
    }

    /// Whether the SSH process is currently running. Says nothing about
    /// authentication; watch the connection state for that.
    pub async fn is_connected(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(TunnelCommand::IsConnected { reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Probe the given mappings once. Mappings whose local side is not
    /// loopback are skipped outright: the supervisor only has standing to
    /// verify its own forwarded sockets.
    pub async fn check_port_status(&self, mappings: Vec<ForwardMapping>) {
        let _ = self.cmd_tx.send(TunnelCommand::CheckPorts { mappings }).await;
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.event_tx.subscribe()
    }

    /// Tear down the supervisor task, terminating any active process.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// The supervisor actor. Owns at most one external SSH process at a time;
/// every state mutation happens inside `run`, so transitions are never
/// concurrent with each other.
struct TunnelSupervisor {
    options: SshOptions,
    cmd_rx: mpsc::Receiver<TunnelCommand>,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<TunnelEvent>,
    shutdown: CancellationToken,
    probe_tx: mpsc::Sender<ProbeResult>,
    probe_rx: mpsc::Receiver<ProbeResult>,

    child: Option<Child>,
    chunk_rx: Option<mpsc::Receiver<OutputChunk>>,
    last_config: Option<TunnelConfig>,
    policy: ReconnectPolicy,
    reconnect_at: Option<Instant>,
    ticker: Option<Interval>,
    monitored: Vec<ForwardMapping>,
    port_status: HashMap<u16, PortStatus>,
}

impl TunnelSupervisor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                _ = self.shutdown.cancelled() => {
                    debug!("supervisor shutting down due to cancellation");
                    break;
                }
                status = wait_child(&mut self.child) => {
                    self.handle_exit(status).await;
                }
                chunk = recv_chunk(&mut self.chunk_rx) => {
                    match chunk {
                        Some(chunk) => self.handle_chunk(chunk),
                        None => self.chunk_rx = None,
                    }
                }
                Some(result) = self.probe_rx.recv() => {
                    self.apply_probe_result(result);
                }
                _ = sleep_until_opt(self.reconnect_at) => {
                    self.fire_reconnect().await;
                }
                _ = tick_opt(&mut self.ticker) => {
                    self.sweep_ports();
                }
            }
        }
        if let Some(child) = self.child.take() {
            terminate(child).await;
        }
    }

    async fn handle_command(&mut self, cmd: TunnelCommand) {
        match cmd {
            TunnelCommand::Start { config, reply } => {
                // A rejected config must leave the session untouched, so the
                // fresh retry budget only applies once validation passes.
                if config.validate().is_ok() {
                    self.reconnect_at = None;
                    self.policy.attempts = 0;
                }
                let started = self.start_process(config).await;
                let _ = reply.send(started);
            }
            TunnelCommand::Stop { reply } => {
                let stopped = self.handle_stop().await;
                let _ = reply.send(stopped);
            }
            TunnelCommand::SetAutoReconnect {
                enabled,
                max_attempts,
            } => {
                self.policy.set(enabled, max_attempts);
                let message = if enabled {
                    format!("Auto-reconnect enabled (max {} attempts)", self.policy.max_attempts)
                } else {
                    "Auto-reconnect disabled".to_string()
                };
                info!("{message}");
                self.emit(TunnelEvent::Output(message));
            }
            TunnelCommand::IsConnected { reply } => {
                let _ = reply.send(self.process_running());
            }
            TunnelCommand::CheckPorts { mappings } => {
                self.spawn_probes(&mappings);
            }
        }
    }

    /// Launch the SSH process for `config`. Validation failure is rejected
    /// with no side effects at all; spawn failure transitions to `Error`.
    async fn start_process(&mut self, config: TunnelConfig) -> bool {
        if let Err(e) = config.validate() {
            warn!("rejecting tunnel config: {e:#}");
            return false;
        }

        if let Some(child) = self.child.take() {
            debug!("stopping previous tunnel before starting a new one");
            terminate(child).await;
            self.drain_chunks().await;
        }

        self.last_config = Some(config.clone());

        let args = build_ssh_args(&config, &self.options);
        let rendered = display_command(&args);
        info!("starting SSH tunnel: {rendered}");
        self.emit(TunnelEvent::Output(format!("Starting SSH tunnel: {rendered}")));

        let mut command = Command::new(&args[0]);
        command
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to start {}: {e}", args[0]);
                error!("{message}");
                self.emit(TunnelEvent::ConnectionStatus {
                    connected: false,
                    message: message.clone(),
                });
                self.set_state(ConnectionState::Error(message));
                return false;
            }
        };

        let (chunk_tx, chunk_rx) = mpsc::channel(64);
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, ChunkKind::Stdout, chunk_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, ChunkKind::Stderr, chunk_tx);
        }
        self.chunk_rx = Some(chunk_rx);
        self.child = Some(child);

        self.monitored = config
            .mappings
            .iter()
            .filter(|m| m.is_loopback())
            .cloned()
            .collect();
        self.port_status = self
            .monitored
            .iter()
            .map(|m| (m.local_port, PortStatus::Connecting))
            .collect();
        let period = self.options.probe_interval;
        self.ticker = Some(time::interval_at(Instant::now() + period, period));

        self.set_state(ConnectionState::Connecting);
        self.emit(TunnelEvent::ConnectionStatus {
            connected: false,
            message: "Connecting...".to_string(),
        });
        true
    }

    /// Stop the session: disable reconnection, cancel anything pending, and
    /// take the process down (SIGTERM, then SIGKILL after the grace window).
    async fn handle_stop(&mut self) -> bool {
        if self.child.is_none() && self.reconnect_at.is_none() {
            return false;
        }

        self.policy.enabled = false;
        self.policy.attempts = 0;
        self.ticker = None;
        if self.reconnect_at.take().is_some() {
            debug!("stop cancelled a pending reconnect");
        }
        if let Some(child) = self.child.take() {
            terminate(child).await;
            self.drain_chunks().await;
        }
        self.finish_stop();
        true
    }

    fn finish_stop(&mut self) {
        for mapping in &self.monitored {
            self.port_status
                .insert(mapping.local_port, PortStatus::Disconnected);
            let _ = self.event_tx.send(TunnelEvent::PortStatus {
                port: mapping.port_label(),
                open: false,
            });
        }
        self.monitored.clear();
        self.port_status.clear();
        self.chunk_rx = None;

        self.set_state(ConnectionState::Disconnected("stopped by user".to_string()));
        self.emit(TunnelEvent::ConnectionStatus {
            connected: false,
            message: "Disconnected (stopped by user)".to_string(),
        });
    }

    /// The process exited on its own. Pending output is reconciled first so a
    /// late "Authenticated to" cannot race the reconnect decision, then the
    /// policy decides whether to schedule a retry.
    async fn handle_exit(&mut self, status: std::io::Result<ExitStatus>) {
        self.child = None;
        self.drain_chunks().await;

        let (exit_code, reason) = match status {
            Ok(status) if status.success() => (0, "exited normally".to_string()),
            Ok(status) => (
                status.code().unwrap_or(-1),
                "terminated unexpectedly".to_string(),
            ),
            Err(e) => (-1, format!("wait failed: {e}")),
        };
        info!("SSH process finished: exit code {exit_code} ({reason})");
        self.emit(TunnelEvent::ProcessFinished {
            exit_code,
            reason: reason.clone(),
        });

        if self.policy.should_retry() {
            self.policy.attempts += 1;
            let delay = self.options.backoff_base * self.policy.attempts;
            info!(
                "scheduling reconnect attempt {}/{} in {:?}",
                self.policy.attempts, self.policy.max_attempts, delay
            );
            self.reconnect_at = Some(Instant::now() + delay);
            self.set_state(ConnectionState::Disconnected(reason.clone()));
            self.emit(TunnelEvent::ConnectionStatus {
                connected: false,
                message: format!(
                    "Disconnected ({reason}), reconnect attempt {}/{} in {}s",
                    self.policy.attempts,
                    self.policy.max_attempts,
                    delay.as_secs()
                ),
            });
        } else if self.policy.exhausted() {
            warn!("giving up after {} reconnect attempts", self.policy.attempts);
            self.ticker = None;
            self.set_state(ConnectionState::Disconnected(
                "max reconnect attempts reached".to_string(),
            ));
            self.emit(TunnelEvent::ConnectionStatus {
                connected: false,
                message: "Disconnected (max reconnect attempts reached)".to_string(),
            });
        } else {
            self.ticker = None;
            self.set_state(ConnectionState::Disconnected(reason.clone()));
            self.emit(TunnelEvent::ConnectionStatus {
                connected: false,
                message: format!("Disconnected ({reason})"),
            });
        }
    }

    /// Flush whatever the reader tasks still have buffered. The readers drop
    /// their sender on EOF, so this normally returns as soon as the channel
    /// closes; the timeout is a guard against a wedged pipe.
    async fn drain_chunks(&mut self) {
        let Some(mut rx) = self.chunk_rx.take() else {
            return;
        };
        loop {
            match time::timeout(DRAIN_TIMEOUT, rx.recv()).await {
                Ok(Some(chunk)) => self.handle_chunk(chunk),
                Ok(None) | Err(_) => break,
            }
        }
    }

    fn handle_chunk(&mut self, chunk: OutputChunk) {
        match chunk.kind {
            ChunkKind::Stdout => self.emit(TunnelEvent::Output(chunk.text.clone())),
            ChunkKind::Stderr => self.emit(TunnelEvent::ErrorOutput(chunk.text.clone())),
        }

        match classify(&chunk.text) {
            Some(OutputClass::Authenticated) => {
                self.policy.attempts = 0;
                if self.state() != ConnectionState::Connected {
                    debug!("authentication detected in client output");
                    self.set_state(ConnectionState::Connected);
                    self.emit(TunnelEvent::ConnectionStatus {
                        connected: true,
                        message: "Connected".to_string(),
                    });
                }
            }
            Some(OutputClass::Fatal(reason)) => {
                warn!("fatal condition in client output: {reason}");
                for status in self.port_status.values_mut() {
                    *status = PortStatus::Error;
                }
                self.set_state(ConnectionState::Error(reason.to_string()));
                self.emit(TunnelEvent::ConnectionStatus {
                    connected: false,
                    message: format!("Connection error: {reason}"),
                });
            }
            None => {}
        }
    }

    async fn fire_reconnect(&mut self) {
        self.reconnect_at = None;
        let Some(config) = self.last_config.clone() else {
            warn!("reconnect fired with no previous config");
            return;
        };
        info!(
            "reconnect attempt {}/{}",
            self.policy.attempts, self.policy.max_attempts
        );
        self.emit(TunnelEvent::Output(format!(
            "Reconnect attempt {}/{}...",
            self.policy.attempts, self.policy.max_attempts
        )));

        if !self.start_process(config).await {
            // A failed replay consumes attempts exactly like an exit does.
            if self.policy.should_retry() {
                self.policy.attempts += 1;
                let delay = self.options.backoff_base * self.policy.attempts;
                self.reconnect_at = Some(Instant::now() + delay);
            } else {
                self.ticker = None;
                self.set_state(ConnectionState::Disconnected(
                    "max reconnect attempts reached".to_string(),
                ));
                self.emit(TunnelEvent::ConnectionStatus {
                    connected: false,
                    message: "Disconnected (max reconnect attempts reached)".to_string(),
                });
            }
        }
    }

    fn sweep_ports(&mut self) {
        let mappings = self.monitored.clone();
        self.spawn_probes(&mappings);
    }

    fn spawn_probes(&self, mappings: &[ForwardMapping]) {
        for mapping in mappings {
            if !mapping.is_loopback() {
                continue;
            }
            let tx = self.probe_tx.clone();
            let host = mapping.local_addr.clone();
            let label = mapping.port_label();
            let port = mapping.local_port;
            tokio::spawn(async move {
                let open = probe(&host, port).await;
                let _ = tx.send(ProbeResult { port, label, open }).await;
            });
        }
    }

    fn apply_probe_result(&mut self, result: ProbeResult) {
        if let Some(status) = self.port_status.get_mut(&result.port) {
            *status = if result.open {
                PortStatus::Connected
            } else {
                PortStatus::Disconnected
            };
        }
        self.emit(TunnelEvent::PortStatus {
            port: result.label,
            open: result.open,
        });
    }

    fn process_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        debug!("connection state -> {state}");
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: TunnelEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }
}

fn spawn_reader<R>(mut reader: R, kind: ChunkKind, tx: mpsc::Sender<OutputChunk>)
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if tx.send(OutputChunk { kind, text }).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// SIGTERM first, SIGKILL once the grace window runs out.
async fn terminate(mut child: Child) {
    if let Some(pid) = child.id() {
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if time::timeout(STOP_GRACE, child.wait()).await.is_ok() {
            return;
        }
        warn!("process {pid} did not exit within {STOP_GRACE:?}, killing");
    }
    let _ = child.kill().await;
}

async fn wait_child(child: &mut Option<Child>) -> std::io::Result<ExitStatus> {
    match child.as_mut() {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

async fn recv_chunk(rx: &mut Option<mpsc::Receiver<OutputChunk>>) -> Option<OutputChunk> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(ticker: &mut Option<Interval>) {
    match ticker.as_mut() {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
