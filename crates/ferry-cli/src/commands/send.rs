//! Send command implementation.
//!
//! Pushes one file to a listening peer with the configured transport.

use anyhow::{Context, Result};

use ferry_core::config::Config;
use ferry_core::file::format_size;
use ferry_core::peer;
use ferry_core::service;

use super::SendArgs;
use crate::ui::ConsoleReporter;

/// Run the send command.
pub async fn run(args: SendArgs, config: Config) -> Result<()> {
    let reporter = ConsoleReporter::new(args.quiet).shared();
    let sender = match args.to.as_deref() {
        Some(to) => {
            service::remote_service(super::server_address(Some(to), &config)?, &config, reporter)
        }
        None => service::peer_service(&config, reporter)
            .context("No peer to send to: pass --to or set node.peer_address")?,
    };

    crate::ui::banner(args.quiet);
    if !args.quiet {
        println!("  Sending {} to {}", args.path.display(), sender.endpoint());
    }

    let result = peer::send_file(sender.as_ref(), &args.path, config.transfer.chunk_size)
        .await
        .with_context(|| format!("Failed to send {}", args.path.display()))?;

    if !args.quiet {
        println!(
            "  Sent {} ({})",
            result.stored_path,
            format_size(result.bytes_received)
        );
    }
    Ok(())
}
