//! Delete command implementation.

use anyhow::{bail, Context, Result};

use ferry_core::config::Config;
use ferry_core::report;
use ferry_core::service::FileService;

use super::DeleteArgs;

/// Run the delete command.
///
/// A file that does not exist is reported and exits non-zero.
pub async fn run(args: DeleteArgs, config: Config) -> Result<()> {
    let addr = super::server_address(args.server.as_deref(), &config)?;
    let remote = super::connect(&addr, &config, report::noop()).await?;

    let result = remote
        .delete(&args.name)
        .await
        .with_context(|| format!("Failed to delete {} on {addr}", args.name))?;

    if !result.success {
        bail!("{}", result.message);
    }
    println!("  {}", result.message);
    Ok(())
}
