//! Config command implementation.

use std::path::Path;

use anyhow::{bail, Context, Result};

use ferry_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs, path: Option<&Path>, config: &Config) -> Result<()> {
    let path = path.map_or_else(Config::config_path, Path::to_path_buf);

    match args.action {
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
            println!("# {}", path.display());
            println!();
            print!("{rendered}");
        }
        ConfigAction::Init { force } => init(&path, force)?,
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Config::default()
        .save_to(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("  Wrote default configuration to {}", path.display());
    Ok(())
}
