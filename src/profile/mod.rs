mod store;

pub use store::{ImportReport, ProfileStore, DEFAULT_FOLDER};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_server_type() -> String {
    "HP/Huawei".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_local_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_key_path() -> String {
    "~/.ssh/id_rsa".to_string()
}

/// A saved connection preset: which management interface to reach, through
/// which gateway, and which of the vendor's ports to forward.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default)]
    pub name: String,
    /// Management interface address on the far side of the gateway.
    #[serde(default)]
    pub target_ip: String,
    #[serde(default)]
    pub ssh_user: String,
    #[serde(default)]
    pub gateway_ip: String,
    #[serde(default = "default_server_type")]
    pub server_type: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default = "default_local_ip")]
    pub local_ip: String,
    #[serde(default = "default_key_path")]
    pub key_path: String,
    /// Per-port enable flags, keyed by port number rendered as a string.
    #[serde(default)]
    pub ports: BTreeMap<String, bool>,
    #[serde(default)]
    pub custom_ports: bool,
}

impl ConnectionProfile {
    pub fn new(
        name: impl Into<String>,
        target_ip: impl Into<String>,
        ssh_user: impl Into<String>,
        gateway_ip: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_ip: target_ip.into(),
            ssh_user: ssh_user.into(),
            gateway_ip: gateway_ip.into(),
            server_type: default_server_type(),
            ssh_port: default_ssh_port(),
            local_ip: default_local_ip(),
            key_path: default_key_path(),
            ports: BTreeMap::new(),
            custom_ports: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && !self.target_ip.is_empty()
            && !self.ssh_user.is_empty()
            && !self.gateway_ip.is_empty()
    }

    /// Ports this profile wants forwarded: the explicitly enabled ones, or
    /// the vendor catalog set when none were picked.
    pub fn enabled_ports(&self) -> Vec<u16> {
        let picked: Vec<u16> = self
            .ports
            .iter()
            .filter(|(_, enabled)| **enabled)
            .filter_map(|(port, _)| port.parse().ok())
            .collect();
        if !picked.is_empty() {
            return picked;
        }
        crate::catalog::ports_for(&self.server_type)
            .map(|ports| ports.iter().map(|(port, _)| *port).collect())
            .unwrap_or_default()
    }
}
