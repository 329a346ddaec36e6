use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "culvert", about = "SSH tunnel manager for out-of-band management interfaces", version)]
pub struct Cli {
    /// Data directory for config and profiles (defaults to the platform
    /// config dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List profile folders
    Folders,
    /// List profiles, optionally limited to one folder
    List {
        folder: Option<String>,
    },
    /// Add a connection profile
    Add {
        name: String,
        /// Management interface address behind the gateway
        #[arg(long)]
        target: String,
        /// SSH username on the gateway
        #[arg(long)]
        user: String,
        /// Gateway host or IP
        #[arg(long)]
        gateway: String,
        /// Vendor type for the default port set
        #[arg(long, default_value = "HP/Huawei")]
        server_type: String,
        /// Gateway SSH port
        #[arg(long, default_value_t = 22)]
        ssh_port: u16,
        /// Identity file
        #[arg(long, default_value = "~/.ssh/id_rsa")]
        key: String,
        /// Folder to store the profile in
        #[arg(long, default_value = culvert::profile::DEFAULT_FOLDER)]
        folder: String,
    },
    /// Delete a profile by folder and index
    Delete {
        folder: String,
        index: usize,
    },
    /// Export all profiles as JSON to stdout
    Export,
    /// Import profiles from a JSON file (merges into existing folders)
    Import {
        file: PathBuf,
    },
    /// List known vendor types and their port sets
    Vendors,
    /// Open a tunnel for a saved profile and keep it up until Ctrl-C
    Connect {
        /// Profile name (searched across folders unless --folder is given)
        name: String,
        #[arg(long)]
        folder: Option<String>,
        /// Verbose SSH client output
        #[arg(long, short)]
        verbose: bool,
        /// Enable SSH compression
        #[arg(long, short)]
        compress: bool,
        /// Reconnect automatically on unexpected exit
        #[arg(long)]
        auto_reconnect: bool,
        /// Maximum reconnect attempts
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,
    },
}
