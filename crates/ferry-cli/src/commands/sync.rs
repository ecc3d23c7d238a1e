//! Sync command implementation.
//!
//! Copies files between two endpoints through the relay. Either side may be
//! `local`, which makes the same command a push (`local` → server) or a
//! pull (server → `local`).

use anyhow::{bail, Context, Result};

use ferry_core::config::Config;
use ferry_core::file::format_size;
use ferry_core::relay::{pulled_name, Relay};

use super::SyncArgs;
use crate::ui::ConsoleReporter;

/// Run the sync command.
pub async fn run(args: SyncArgs, config: Config) -> Result<()> {
    let reporter = ConsoleReporter::new(args.quiet).shared();
    let source = super::endpoint(&args.from, &config, reporter.clone()).await?;
    let destination = super::endpoint(&args.to, &config, reporter.clone()).await?;

    let relay = Relay::new()
        .with_reporter(reporter)
        .with_chunk_size(config.transfer.chunk_size);

    crate::ui::banner(args.quiet);

    if args.all {
        let report = relay
            .sync_all(source.as_ref(), destination.as_ref())
            .await
            .with_context(|| format!("Failed to list {}", source.endpoint()))?;

        if !args.quiet {
            println!();
            println!(
                "  Synced {} file(s), {} from {} to {}",
                report.synced.len(),
                format_size(report.bytes()),
                source.endpoint(),
                destination.endpoint()
            );
        }
        if !report.is_complete() {
            for failure in &report.failed {
                eprintln!("  Failed: {}: {}", failure.filename, failure.error);
            }
            bail!("{} file(s) failed to sync", report.failed.len());
        }
        return Ok(());
    }

    let Some(name) = args.name.as_deref() else {
        bail!("Give a file name or --all");
    };
    let stored = match (&args.to_name, &args.label) {
        (Some(to_name), _) => Some(to_name.clone()),
        (None, Some(label)) => Some(pulled_name(label, name)),
        (None, None) => None,
    };

    let result = relay
        .sync_file(source.as_ref(), destination.as_ref(), name, stored.as_deref())
        .await
        .with_context(|| format!("Failed to sync {name}"))?;

    if !args.quiet {
        println!(
            "  Copied {} ({}) to {}",
            name,
            format_size(result.bytes_received),
            result.stored_path
        );
    }
    Ok(())
}
