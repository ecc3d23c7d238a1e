//! Peer command implementation.
//!
//! Listens for pushes and, at the same time, sends any files given with
//! `--send` to the configured peer. Both directions use
//! `transfer.transport`.

use std::sync::Arc;

use anyhow::{Context, Result};

use ferry_core::config::Config;
use ferry_core::file::format_size;
use ferry_core::peer;
use ferry_core::report::TracingReporter;
use ferry_core::service;
use ferry_core::storage::RootLock;

use super::PeerArgs;
use crate::ui::ConsoleReporter;

/// Run the peer command.
pub async fn run(args: PeerArgs, mut config: Config) -> Result<()> {
    if let Some(port) = args.port {
        config.node.port = port;
    }
    if let Some(to) = args.to {
        config.node.peer_address = Some(to);
    }
    config.validate().context("Invalid configuration")?;

    let receiver = super::open_storage(
        &config,
        RootLock::new(),
        &config.storage.received_prefix,
        Arc::new(TracingReporter),
    )
    .await?;

    let addr = config.listen_endpoint();
    let handle = peer::listen(
        &addr,
        receiver.shared(),
        &config,
        ConsoleReporter::new(false).shared(),
    )
    .await
    .with_context(|| format!("Failed to listen on {addr}"))?;

    crate::ui::banner(false);
    println!(
        "  Peer listening on {} ({:?} transport)",
        handle.local_addr(),
        config.transfer.transport
    );
    println!(
        "  Received files go to {} as {}<name>",
        config.storage.root.display(),
        config.storage.received_prefix
    );
    println!();

    let mut sends = Vec::with_capacity(args.send.len());
    if !args.send.is_empty() {
        let sender = service::peer_service(&config, ConsoleReporter::new(true).shared())
            .context("No peer to send to: pass --to or set node.peer_address")?;
        let chunk_size = config.transfer.chunk_size;

        for path in args.send {
            let sender = Arc::clone(&sender);
            sends.push(tokio::spawn(async move {
                match peer::send_file(sender.as_ref(), &path, chunk_size).await {
                    Ok(result) => println!(
                        "  Sent {} ({}) to {}",
                        result.stored_path,
                        format_size(result.bytes_received),
                        sender.endpoint()
                    ),
                    Err(e) => eprintln!("  Error: failed to send {}: {e}", path.display()),
                }
            }));
        }
    }

    println!("  Press Ctrl-C to stop.");
    let _ = tokio::signal::ctrl_c().await;

    for send in sends {
        send.abort();
    }
    handle.shutdown().await?;

    println!();
    println!("  Peer stopped.");
    Ok(())
}
