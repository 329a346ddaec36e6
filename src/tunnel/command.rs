use crate::tunnel::model::{HostKeyPolicy, SshOptions, TunnelConfig};

/// Expand a leading `~` against the home directory. Paths without a tilde
/// pass through untouched, as does everything when no home dir is known.
pub fn expand_identity_path(path: &str) -> String {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().into_owned();
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

/// Build the argv for the external SSH client. Pure and deterministic; the
/// config is assumed already validated and mappings are emitted verbatim in
/// their configured order.
pub fn build_ssh_args(config: &TunnelConfig, options: &SshOptions) -> Vec<String> {
    let mut cmd: Vec<String> = Vec::new();

    if options.elevate {
        cmd.push("sudo".into());
    }
    cmd.push(options.program.clone());

    cmd.push("-i".into());
    cmd.push(expand_identity_path(&config.key_path));

    cmd.push("-p".into());
    cmd.push(config.ssh_port.to_string());

    if config.verbose {
        cmd.push("-v".into());
    }
    if config.compress {
        cmd.push("-C".into());
    }
    if config.identity_only {
        cmd.push("-o".into());
        cmd.push("IdentitiesOnly=yes".into());
    }

    cmd.push("-o".into());
    cmd.push(format!("ConnectTimeout={}", config.timeout_secs));

    cmd.push("-o".into());
    cmd.push("ServerAliveInterval=15".into());
    cmd.push("-o".into());
    cmd.push("ServerAliveCountMax=3".into());

    match options.host_key_policy {
        HostKeyPolicy::Strict => {}
        HostKeyPolicy::AcceptNew => {
            cmd.push("-o".into());
            cmd.push("StrictHostKeyChecking=accept-new".into());
        }
        HostKeyPolicy::AcceptAny => {
            cmd.push("-o".into());
            cmd.push("StrictHostKeyChecking=no".into());
            cmd.push("-o".into());
            cmd.push("UserKnownHostsFile=/dev/null".into());
        }
    }

    for mapping in &config.mappings {
        cmd.push("-L".into());
        cmd.push(mapping.to_string());
    }

    cmd.push(format!("{}@{}", config.user, config.gateway));

    cmd
}

/// Shell-quoted rendering of the argv, for logs and the output event stream.
pub fn display_command(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape::escape(a.as_str().into()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
