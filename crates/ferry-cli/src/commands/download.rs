//! Download command implementation.
//!
//! The local file is written atomically, so a failed download leaves
//! nothing behind.

use anyhow::{Context, Result};

use ferry_core::config::Config;
use ferry_core::file::{format_size, FileSink};
use ferry_core::service::FileService;
use ferry_core::storage::validate_filename;

use super::DownloadArgs;
use crate::ui::ConsoleReporter;

/// Run the download command.
pub async fn run(args: DownloadArgs, config: Config) -> Result<()> {
    validate_filename(&args.name)?;
    let addr = super::server_address(args.server.as_deref(), &config)?;

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let destination = args.output.join(&args.name);

    crate::ui::banner(args.quiet);
    if !args.quiet {
        println!("  Downloading {} from {}", args.name, addr);
    }

    let remote = super::connect(&addr, &config, ConsoleReporter::new(args.quiet).shared()).await?;
    let mut sink = FileSink::new(&destination);
    let summary = remote
        .download(&args.name, &mut sink)
        .await
        .with_context(|| format!("Download of {} failed", args.name))?;

    if !args.quiet {
        println!(
            "  Saved {} ({})",
            destination.display(),
            format_size(summary.bytes)
        );
    }
    Ok(())
}
