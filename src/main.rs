mod cli;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use culvert::catalog;
use culvert::config::{default_data_dir, AppConfig};
use culvert::profile::{ConnectionProfile, ProfileStore};
use culvert::tunnel::{ConnectionState, ForwardMapping, TunnelConfig, TunnelEvent, TunnelHandle};
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config = AppConfig::load(&data_dir);
    let mut store = ProfileStore::open(&data_dir)?;

    match cli.command {
        Command::Folders => {
            for folder in store.folders() {
                println!("{folder}");
            }
        }
        Command::List { folder } => {
            let folders = match folder {
                Some(f) => vec![f],
                None => store.folders(),
            };
            for folder in folders {
                println!("{folder}/");
                for (i, profile) in store.profiles(&folder).iter().enumerate() {
                    println!(
                        "  [{i}] {} -> {} via {}@{} ({})",
                        profile.name,
                        profile.target_ip,
                        profile.ssh_user,
                        profile.gateway_ip,
                        profile.server_type
                    );
                }
            }
        }
        Command::Add {
            name,
            target,
            user,
            gateway,
            server_type,
            ssh_port,
            key,
            folder,
        } => {
            let mut profile = ConnectionProfile::new(name, target, user, gateway);
            profile.server_type = server_type;
            profile.ssh_port = ssh_port;
            profile.key_path = key;
            store.add_profile(profile, &folder)?;
            println!("profile saved to folder {folder:?}");
        }
        Command::Delete { folder, index } => {
            store.delete_profile(&folder, index)?;
            println!("profile deleted");
        }
        Command::Export => {
            println!("{}", store.export_json()?);
        }
        Command::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let report = store.import_json(&json)?;
            println!("imported {} profile(s)", report.imported);
            for error in &report.errors {
                eprintln!("skipped: {error}");
            }
        }
        Command::Vendors => {
            for name in catalog::server_types() {
                println!("{name}: {}", catalog::description(name));
                if let Some(ports) = catalog::ports_for(name) {
                    for (port, label) in ports {
                        println!("  {port}: {label}");
                    }
                }
            }
        }
        Command::Connect {
            name,
            folder,
            verbose,
            compress,
            auto_reconnect,
            max_attempts,
        } => {
            let (profile, found_in, _) = store
                .find_by_name(&name, folder.as_deref())
                .ok_or_else(|| anyhow!("no profile named {name:?}"))?;
            info!("using profile {name:?} from folder {found_in:?}");
            let profile = profile.clone();
            connect(&config, &profile, verbose, compress, auto_reconnect, max_attempts).await?;
        }
    }

    Ok(())
}

fn mappings_for(profile: &ConnectionProfile) -> Vec<ForwardMapping> {
    profile
        .enabled_ports()
        .into_iter()
        .map(|port| ForwardMapping {
            local_addr: profile.local_ip.clone(),
            local_port: port,
            remote_host: profile.target_ip.clone(),
            remote_port: port,
        })
        .collect()
}

async fn connect(
    config: &AppConfig,
    profile: &ConnectionProfile,
    verbose: bool,
    compress: bool,
    auto_reconnect: bool,
    max_attempts: u32,
) -> Result<()> {
    let mut tunnel_config = TunnelConfig::new(
        profile.key_path.clone(),
        profile.ssh_port,
        mappings_for(profile),
        profile.ssh_user.clone(),
        profile.gateway_ip.clone(),
    );
    tunnel_config.verbose = verbose;
    tunnel_config.compress = compress;

    let handle = TunnelHandle::spawn(config.ssh_options());
    let mut events = handle.subscribe();

    if auto_reconnect || config.auto_reconnect {
        let max = if auto_reconnect {
            max_attempts
        } else {
            config.max_reconnect_attempts
        };
        handle.set_auto_reconnect(true, max).await;
    }

    if !handle.start(tunnel_config).await {
        handle.shutdown();
        return Err(anyhow!("tunnel failed to start: {}", handle.state()));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("stopping tunnel...");
                handle.stop().await;
                break;
            }
            event = events.recv() => {
                let Ok(event) = event else { break };
                match event {
                    TunnelEvent::Output(text) => print!("{text}"),
                    TunnelEvent::ErrorOutput(text) => eprint!("{text}"),
                    TunnelEvent::ConnectionStatus { message, .. } => println!("* {message}"),
                    TunnelEvent::PortStatus { port, open } => {
                        println!("* port {port}: {}", if open { "open" } else { "closed" });
                    }
                    TunnelEvent::ProcessFinished { exit_code, reason } => {
                        println!("* SSH process finished: {reason} (code {exit_code})");
                    }
                }
                // Without reconnection a disconnect is terminal.
                if matches!(handle.state(), ConnectionState::Disconnected(_))
                    && !handle.is_connected().await
                    && !auto_reconnect
                    && !config.auto_reconnect
                {
                    break;
                }
            }
        }
    }

    handle.shutdown();
    Ok(())
}
