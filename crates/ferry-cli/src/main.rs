//! Ferry CLI - chunked streaming file transfer
//!
//! Ferry moves whole files between nodes over a persistent connection, runs
//! as a raw-socket peer, and relays files from one node to another.
//!
//! ## Quick Start
//!
//! ```bash
//! # Serve ./uploads on port 8000
//! ferry serve
//!
//! # Upload and fetch back (on another machine)
//! ferry upload report.txt --server 10.0.0.2
//! ferry download report.txt --server 10.0.0.2
//!
//! # Copy a file from one server to another
//! ferry sync 10.0.0.2 10.0.0.3 report.txt
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Serve(args) => commands::serve::run(args, config).await,
        Command::Peer(args) => commands::peer::run(args, config).await,
        Command::Send(args) => commands::send::run(args, config).await,
        Command::Upload(args) => commands::upload::run(args, config).await,
        Command::Download(args) => commands::download::run(args, config).await,
        Command::List(args) => commands::list::run(args, config).await,
        Command::Delete(args) => commands::delete::run(args, config).await,
        Command::Sync(args) => commands::sync::run(args, config).await,
        Command::Config(args) => commands::config::run(args, cli.config.as_deref(), &config),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,ferry=info,ferry_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
