//! Static catalog of per-vendor management interface port sets.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Default subset worth active liveness monitoring for any vendor.
pub const DEFAULT_ESSENTIAL_PORTS: &[u16] = &[22, 80, 443];

pub struct ServerType {
    pub name: &'static str,
    pub description: &'static str,
    /// Port number and what runs on it.
    pub ports: &'static [(u16, &'static str)],
    pub essential_ports: &'static [u16],
}

pub static SERVER_TYPES: &[ServerType] = &[
    ServerType {
        name: "HP/Huawei",
        description: "iLO & iBMC",
        ports: &[
            (22, "SSH"),
            (80, "HTTP"),
            (443, "HTTPS"),
            (23, "Telnet"),
            (3389, "RDP"),
            (17988, "iLO"),
            (9300, "iLO"),
            (17990, "iLO"),
            (3002, "iLO"),
            (2198, "iLO"),
        ],
        essential_ports: DEFAULT_ESSENTIAL_PORTS,
    },
    ServerType {
        name: "Dell",
        description: "iDRAC",
        ports: &[
            (22, "SSH"),
            (80, "HTTP"),
            (443, "HTTPS"),
            (623, "IPMI"),
            (5000, "iDRAC"),
            (5900, "VNC"),
            (5901, "VNC"),
        ],
        essential_ports: DEFAULT_ESSENTIAL_PORTS,
    },
    ServerType {
        name: "Lenovo",
        description: "IMM or XCC",
        ports: &[
            (22, "SSH"),
            (80, "HTTP"),
            (443, "HTTPS"),
            (5900, "VNC"),
            (5986, "WinRM"),
            (8889, "IMM/XCC"),
            (8080, "IMM/XCC"),
        ],
        essential_ports: DEFAULT_ESSENTIAL_PORTS,
    },
    ServerType {
        name: "Cisco",
        description: "Cisco UCS servers with CIMC interface",
        ports: &[
            (22, "SSH"),
            (80, "HTTP"),
            (443, "HTTPS"),
            (623, "IPMI"),
            (5988, "CIMC"),
            (8443, "CIMC Web"),
        ],
        essential_ports: DEFAULT_ESSENTIAL_PORTS,
    },
    ServerType {
        name: "Custom",
        description: "Custom port configuration",
        ports: &[],
        essential_ports: DEFAULT_ESSENTIAL_PORTS,
    },
];

static BY_NAME: Lazy<HashMap<&'static str, &'static ServerType>> =
    Lazy::new(|| SERVER_TYPES.iter().map(|t| (t.name, t)).collect());

pub fn server_types() -> Vec<&'static str> {
    SERVER_TYPES.iter().map(|t| t.name).collect()
}

pub fn ports_for(server_type: &str) -> Option<&'static [(u16, &'static str)]> {
    BY_NAME.get(server_type).map(|t| t.ports)
}

/// Essential ports for a vendor; unknown vendors get the default SSH/HTTP/
/// HTTPS set rather than nothing.
pub fn essential_ports(server_type: &str) -> &'static [u16] {
    BY_NAME
        .get(server_type)
        .map(|t| t.essential_ports)
        .unwrap_or(DEFAULT_ESSENTIAL_PORTS)
}

pub fn description(server_type: &str) -> &'static str {
    BY_NAME.get(server_type).map(|t| t.description).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vendors_present() {
        let names = server_types();
        for name in ["HP/Huawei", "Dell", "Lenovo", "Cisco", "Custom"] {
            assert!(names.contains(&name), "{name} missing from catalog");
        }
    }

    #[test]
    fn lookups() {
        let ports = ports_for("Dell").unwrap();
        assert!(ports.iter().any(|(p, label)| *p == 623 && *label == "IPMI"));
        assert!(ports_for("Unknown").is_none());
        assert_eq!(description("HP/Huawei"), "iLO & iBMC");
    }

    #[test]
    fn essential_ports_fall_back_to_default() {
        assert_eq!(essential_ports("Cisco"), DEFAULT_ESSENTIAL_PORTS);
        assert_eq!(essential_ports("Unknown"), DEFAULT_ESSENTIAL_PORTS);
    }
}
