//! Upload command implementation.

use anyhow::{Context, Result};

use ferry_core::config::Config;
use ferry_core::file::{format_size, FileSource};
use ferry_core::service;

use super::UploadArgs;
use crate::ui::ConsoleReporter;

/// Run the upload command.
pub async fn run(args: UploadArgs, config: Config) -> Result<()> {
    let addr = super::server_address(args.server.as_deref(), &config)?;
    let quiet = args.quiet || args.json;

    let source = match args.name {
        Some(name) => FileSource::open_as(&args.path, name).await,
        None => FileSource::open(&args.path).await,
    }
    .with_context(|| format!("Failed to open {}", args.path.display()))?;
    let mut source = source.with_chunk_size(config.transfer.chunk_size);

    crate::ui::banner(quiet);
    if !quiet {
        println!(
            "  Uploading {} ({}) to {}",
            args.path.display(),
            format_size(source.file_size()),
            addr
        );
    }

    let remote = service::remote_service(addr, &config, ConsoleReporter::new(quiet).shared());
    let result = remote
        .upload(&mut source)
        .await
        .with_context(|| format!("Upload of {} failed", args.path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !args.quiet {
        println!("  Stored at {}", result.stored_path);
        println!("  {}", result.message);
    }
    Ok(())
}
