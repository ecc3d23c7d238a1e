//! List command implementation.

use anyhow::{Context, Result};

use ferry_core::config::Config;
use ferry_core::report;
use ferry_core::service::FileService;

use super::ListArgs;

/// Run the list command.
pub async fn run(args: ListArgs, config: Config) -> Result<()> {
    let addr = super::server_address(args.server.as_deref(), &config)?;
    let remote = super::connect(&addr, &config, report::noop()).await?;

    let listing = remote
        .list()
        .await
        .with_context(|| format!("Failed to list files on {addr}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.files.is_empty() {
        println!("  No files on {addr}.");
        return Ok(());
    }

    println!("  {} file(s) on {addr}:", listing.files.len());
    for name in &listing.files {
        println!("    {name}");
    }
    Ok(())
}
