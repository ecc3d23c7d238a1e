//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ferry_core::config::{with_default_port, Config};
use ferry_core::report::SharedReporter;
use ferry_core::service::{ConnectOptions, FileService, LocalService, RemoteService};
use ferry_core::storage::{RootLock, StorageRoot};

pub mod config;
pub mod delete;
pub mod download;
pub mod list;
pub mod peer;
pub mod send;
pub mod serve;
pub mod sync;
pub mod upload;

/// Load configuration from `path`, or from the default location.
///
/// A missing default file yields the defaults; an explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().context("Failed to load config"),
    }
}

/// Address of the server to call: the flag, else the configured peer.
pub fn server_address(flag: Option<&str>, config: &Config) -> Result<String> {
    match flag {
        Some(addr) => Ok(with_default_port(addr, config.node.port)),
        None => config
            .peer_endpoint()
            .context("No server given: pass --server or set node.peer_address"),
    }
}

/// Connect to the server at `addr`.
pub async fn connect(addr: &str, config: &Config, reporter: SharedReporter) -> Result<RemoteService> {
    let remote = RemoteService::connect(addr, ConnectOptions::from_config(config))
        .await
        .with_context(|| format!("Failed to connect to {addr}"))?;
    Ok(remote.with_reporter(reporter))
}

/// Open this node's storage root, storing under `prefix`.
pub async fn open_storage(
    config: &Config,
    lock: RootLock,
    prefix: &str,
    reporter: SharedReporter,
) -> Result<LocalService> {
    let storage = StorageRoot::new(&config.storage.root, lock).with_prefix(prefix);
    let local = LocalService::open(storage)
        .await
        .with_context(|| format!("Failed to open storage root {}", config.storage.root.display()))?;
    Ok(local
        .with_reporter(reporter)
        .with_chunk_size(config.transfer.chunk_size))
}

/// An endpoint named on the command line: `local` or a server address.
pub async fn endpoint(
    name: &str,
    config: &Config,
    reporter: SharedReporter,
) -> Result<Arc<dyn FileService>> {
    if name == "local" {
        let local = open_storage(config, RootLock::new(), "", reporter).await?;
        return Ok(local.shared());
    }
    let addr = server_address(Some(name), config)?;
    Ok(Arc::new(connect(&addr, config, reporter).await?))
}

/// Ferry - chunked streaming file transfer
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "FERRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Serve the storage root over the framed protocol
    Serve(ServeArgs),

    /// Run as a raw-socket peer, receiving and optionally sending files
    Peer(PeerArgs),

    /// Push a file to the peer over the raw form
    Send(SendArgs),

    /// Upload a file to a server
    Upload(UploadArgs),

    /// Download a file from a server
    Download(DownloadArgs),

    /// List files stored on a server
    List(ListArgs),

    /// Delete a file from a server
    Delete(DeleteArgs),

    /// Copy files from one endpoint to another
    Sync(SyncArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Directory to serve (overrides storage.root)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Port to listen on (overrides node.port)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Arguments for the peer command
#[derive(Parser)]
pub struct PeerArgs {
    /// Files to push to the configured peer once listening
    #[arg(short, long = "send")]
    pub send: Vec<PathBuf>,

    /// Port to listen on (overrides node.port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Peer address (overrides node.peer_address)
    #[arg(long)]
    pub to: Option<String>,
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// File to push
    pub path: PathBuf,

    /// Peer address (defaults to node.peer_address)
    #[arg(long)]
    pub to: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the upload command
#[derive(Parser)]
pub struct UploadArgs {
    /// File to upload
    pub path: PathBuf,

    /// Server address (defaults to node.peer_address)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Store under this name instead of the file's own
    #[arg(long = "as")]
    pub name: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the download command
#[derive(Parser)]
pub struct DownloadArgs {
    /// Name of the file on the server
    pub name: String,

    /// Server address (defaults to node.peer_address)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Directory to write into
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the list command
#[derive(Parser)]
pub struct ListArgs {
    /// Server address (defaults to node.peer_address)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the delete command
#[derive(Parser)]
pub struct DeleteArgs {
    /// Name of the file on the server
    pub name: String,

    /// Server address (defaults to node.peer_address)
    #[arg(short, long)]
    pub server: Option<String>,
}

/// Arguments for the sync command
#[derive(Parser)]
pub struct SyncArgs {
    /// Source endpoint: a server address, or `local` for this node's root
    pub from: String,

    /// Destination endpoint: a server address, or `local`
    pub to: String,

    /// File to copy (omit with --all)
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub name: Option<String>,

    /// Copy every file the source lists
    #[arg(long)]
    pub all: bool,

    /// Store under this name at the destination
    #[arg(long, conflicts_with_all = ["all", "label"])]
    pub to_name: Option<String>,

    /// Store as `from_<LABEL>_<name>` at the destination
    #[arg(long, conflicts_with = "all")]
    pub label: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_server_address_resolution() {
        let mut config = Config::default();
        assert_eq!(
            server_address(Some("10.0.0.2:9000"), &config).expect("explicit"),
            "10.0.0.2:9000"
        );
        assert_eq!(
            server_address(Some("10.0.0.2"), &config).expect("host only"),
            "10.0.0.2:8000"
        );
        assert_eq!(
            server_address(Some("::1"), &config).expect("bare ipv6"),
            "[::1]:8000"
        );
        assert_eq!(
            server_address(Some("[::1]:9000"), &config).expect("bracketed ipv6"),
            "[::1]:9000"
        );
        assert!(server_address(None, &config).is_err());

        config.node.peer_address = Some("10.0.0.3".to_string());
        assert_eq!(
            server_address(None, &config).expect("configured peer"),
            "10.0.0.3:8000"
        );
    }

    #[test]
    fn test_sync_requires_name_or_all() {
        assert!(Cli::try_parse_from(["ferry", "sync", "a:1", "b:2"]).is_err());
        assert!(Cli::try_parse_from(["ferry", "sync", "a:1", "b:2", "x.txt"]).is_ok());
        assert!(Cli::try_parse_from(["ferry", "sync", "a:1", "b:2", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["ferry", "sync", "a:1", "b:2", "x.txt", "--all"]).is_err());
    }
}
