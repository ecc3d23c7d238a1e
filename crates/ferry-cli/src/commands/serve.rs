//! Serve command implementation.
//!
//! Hosts this node's storage root over the framed protocol until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};

use ferry_core::config::Config;
use ferry_core::report::TracingReporter;
use ferry_core::server::Server;
use ferry_core::storage::RootLock;

use super::ServeArgs;

/// Run the serve command.
pub async fn run(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(root) = args.root {
        config.storage.root = root;
    }
    if let Some(port) = args.port {
        config.node.port = port;
    }
    config.validate().context("Invalid configuration")?;

    let local = super::open_storage(&config, RootLock::new(), "", Arc::new(TracingReporter)).await?;

    let addr = config.listen_endpoint();
    let server = Server::bind(&addr, local.shared())
        .await
        .with_context(|| format!("Failed to listen on {addr}"))?
        .with_io_timeout(config.transfer.io_timeout);

    crate::ui::banner(false);
    println!("  Serving {}", config.storage.root.display());
    println!("  Listening on {}", server.local_addr()?);
    println!();
    println!("  Press Ctrl-C to stop.");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    println!();
    println!("  Server stopped.");
    Ok(())
}
