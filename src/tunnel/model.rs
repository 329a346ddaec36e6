use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::oneshot;

/// One `-L` forwarding rule: `localAddr:localPort:remoteHost:remotePort`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardMapping {
    pub local_addr: String,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl ForwardMapping {
    /// Only loopback-local mappings are ever probed; the forwarded socket is
    /// the only side the supervisor has standing to verify.
    pub fn is_loopback(&self) -> bool {
        self.local_addr == "127.0.0.1" || self.local_addr == "localhost"
    }

    pub fn port_label(&self) -> String {
        format!("{}:{}", self.local_addr, self.local_port)
    }
}

fn parse_port(s: &str) -> Result<u16> {
    let port: u32 = s
        .parse()
        .map_err(|_| anyhow!("invalid port number: {s:?}"))?;
    if port == 0 || port > 65535 {
        bail!("port out of range 1-65535: {port}");
    }
    Ok(port as u16)
}

impl FromStr for ForwardMapping {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            bail!("malformed forward mapping {s:?}, expected local_addr:local_port:remote_host:remote_port");
        }
        if parts[0].is_empty() || parts[2].is_empty() {
            bail!("malformed forward mapping {s:?}, empty address field");
        }
        Ok(Self {
            local_addr: parts[0].to_string(),
            local_port: parse_port(parts[1])?,
            remote_host: parts[2].to_string(),
            remote_port: parse_port(parts[3])?,
        })
    }
}

impl fmt::Display for ForwardMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.local_addr, self.local_port, self.remote_host, self.remote_port
        )
    }
}

/// Immutable description of one connection attempt.
#[derive(Clone, Debug)]
pub struct TunnelConfig {
    pub key_path: String,
    pub ssh_port: u16,
    pub mappings: Vec<ForwardMapping>,
    pub user: String,
    pub gateway: String,
    pub verbose: bool,
    pub compress: bool,
    pub identity_only: bool,
    pub timeout_secs: u32,
}

impl TunnelConfig {
    pub fn new(
        key_path: impl Into<String>,
        ssh_port: u16,
        mappings: Vec<ForwardMapping>,
        user: impl Into<String>,
        gateway: impl Into<String>,
    ) -> Self {
        Self {
            key_path: key_path.into(),
            ssh_port,
            mappings,
            user: user.into(),
            gateway: gateway.into(),
            verbose: false,
            compress: false,
            identity_only: true,
            timeout_secs: 30,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_path.is_empty() {
            bail!("identity file path is empty");
        }
        if self.user.is_empty() {
            bail!("gateway username is empty");
        }
        if self.gateway.is_empty() {
            bail!("gateway address is empty");
        }
        if self.ssh_port == 0 {
            bail!("gateway SSH port must be 1-65535");
        }
        if self.mappings.is_empty() {
            bail!("at least one forward mapping is required");
        }
        if !(5..=120).contains(&self.timeout_secs) {
            bail!("connect timeout must be 5-120 seconds, got {}", self.timeout_secs);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected(String),
    Error(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected(reason) => write!(f, "disconnected ({reason})"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Liveness of one monitored forwarded port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Reconnection bookkeeping. Owned exclusively by the supervisor task; the
/// counter is 0-based and never mutated outside its control loop.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub attempts: u32,
}

impl ReconnectPolicy {
    pub fn set(&mut self, enabled: bool, max_attempts: u32) {
        self.enabled = enabled;
        self.max_attempts = max_attempts.clamp(1, 10);
        self.attempts = 0;
    }

    pub fn should_retry(&self) -> bool {
        self.enabled && self.attempts < self.max_attempts
    }

    pub fn exhausted(&self) -> bool {
        self.enabled && self.attempts >= self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            attempts: 0,
        }
    }
}

/// Host-key verification stance passed to the external SSH client.
///
/// Management-network endpoints are re-imaged often enough that the permissive
/// modes are genuinely useful, but they trade away host-key pinning, so strict
/// checking is the default and anything weaker is an explicit caller choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    #[default]
    Strict,
    AcceptNew,
    /// `StrictHostKeyChecking=no` with a null known-hosts file.
    AcceptAny,
}

/// Supervisor knobs, passed explicitly into the constructor.
#[derive(Clone, Debug)]
pub struct SshOptions {
    /// External SSH client binary.
    pub program: String,
    /// Prefix the invocation with `sudo` (needed for privileged local ports).
    pub elevate: bool,
    pub host_key_policy: HostKeyPolicy,
    /// Base delay for linear reconnect backoff (attempt n waits n x base).
    pub backoff_base: Duration,
    /// Interval between port liveness sweeps.
    pub probe_interval: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            elevate: false,
            host_key_policy: HostKeyPolicy::default(),
            backoff_base: Duration::from_secs(5),
            probe_interval: Duration::from_secs(2),
        }
    }
}

/// Events emitted by the supervisor to its caller.
#[derive(Clone, Debug)]
pub enum TunnelEvent {
    Output(String),
    ErrorOutput(String),
    ProcessFinished { exit_code: i32, reason: String },
    ConnectionStatus { connected: bool, message: String },
    PortStatus { port: String, open: bool },
}

#[derive(Debug)]
pub enum TunnelCommand {
    Start {
        config: TunnelConfig,
        reply: oneshot::Sender<bool>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    SetAutoReconnect {
        enabled: bool,
        max_attempts: u32,
    },
    IsConnected {
        reply: oneshot::Sender<bool>,
    },
    CheckPorts {
        mappings: Vec<ForwardMapping>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(s: &str) -> ForwardMapping {
        s.parse().unwrap()
    }

    #[test]
    fn mapping_roundtrip() {
        let m = mapping("127.0.0.1:2022:10.0.0.5:22");
        assert_eq!(m.local_addr, "127.0.0.1");
        assert_eq!(m.local_port, 2022);
        assert_eq!(m.remote_host, "10.0.0.5");
        assert_eq!(m.remote_port, 22);
        assert_eq!(m.to_string(), "127.0.0.1:2022:10.0.0.5:22");
    }

    #[test]
    fn mapping_rejects_malformed() {
        assert!("127.0.0.1:2022:10.0.0.5".parse::<ForwardMapping>().is_err());
        assert!("127.0.0.1:2022:10.0.0.5:22:extra".parse::<ForwardMapping>().is_err());
        assert!("127.0.0.1:0:10.0.0.5:22".parse::<ForwardMapping>().is_err());
        assert!("127.0.0.1:70000:10.0.0.5:22".parse::<ForwardMapping>().is_err());
        assert!(":2022:10.0.0.5:22".parse::<ForwardMapping>().is_err());
        assert!("127.0.0.1:abc:10.0.0.5:22".parse::<ForwardMapping>().is_err());
    }

    #[test]
    fn loopback_detection() {
        assert!(mapping("127.0.0.1:80:10.0.0.5:80").is_loopback());
        assert!(mapping("localhost:80:10.0.0.5:80").is_loopback());
        assert!(!mapping("10.0.0.1:80:10.0.0.5:80").is_loopback());
    }

    #[test]
    fn config_validation() {
        let valid = TunnelConfig::new(
            "~/.ssh/id_rsa",
            22,
            vec![mapping("127.0.0.1:2022:10.0.0.5:22")],
            "admin",
            "bastion.example.com",
        );
        assert!(valid.validate().is_ok());

        let mut no_user = valid.clone();
        no_user.user.clear();
        assert!(no_user.validate().is_err());

        let mut no_gateway = valid.clone();
        no_gateway.gateway.clear();
        assert!(no_gateway.validate().is_err());

        let mut no_mappings = valid.clone();
        no_mappings.mappings.clear();
        assert!(no_mappings.validate().is_err());

        let mut bad_timeout = valid.clone();
        bad_timeout.timeout_secs = 3;
        assert!(bad_timeout.validate().is_err());
    }

    #[test]
    fn policy_counting() {
        let mut policy = ReconnectPolicy::default();
        policy.set(true, 2);
        assert!(policy.should_retry());
        policy.attempts = 2;
        assert!(!policy.should_retry());
        assert!(policy.exhausted());

        policy.set(true, 50);
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.attempts, 0);
    }
}
