//! localdb-template
//!
//! Command line companion for the template cache: inspect LocalDB instances
//! and remove ones whose template should be rebuilt from scratch.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use localdb_template::TemplateSettings;
use localdb_template::cli::{Cli, Command};
use localdb_template::fs::remove_dir_if_exists;
use localdb_template::logging::{self, LogTarget};
use localdb_template::paths;
use localdb_template::server::{InstanceController, SqlLocalDb};
use serde_json::json;
use tracing::{debug, info};

/// Settings from `--config` (if given), with the command line instance and
/// `LOCALDB_TEMPLATE_*` variables applied on top.
fn resolve_settings(cli: &Cli) -> Result<TemplateSettings> {
    let mut settings = match &cli.config {
        Some(path) => TemplateSettings::load(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => {
            let instance = cli
                .command
                .instance()
                .ok_or_else(|| anyhow!("An instance name or --config is required"))?;
            TemplateSettings::new(instance)
        }
    };
    if let Some(instance) = cli.command.instance() {
        settings.instance = instance.to_string();
    }
    settings.apply_env()?;
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let target: LogTarget = cli.log.parse()?;
    logging::init(&target, cli.verbose)?;

    let settings = resolve_settings(&cli)?;
    debug!(?settings, "resolved settings");
    let localdb = SqlLocalDb::new();
    let instance = settings.instance.as_str();

    match &cli.command {
        Command::Info { json, .. } => {
            let info = localdb.info(instance).await?;
            if *json {
                let value = json!({
                    "instance": instance,
                    "server": paths::server_name(instance),
                    "state": info.state(),
                    "directory": settings.resolved_directory(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}: {:?}", paths::server_name(instance), info.state());
            }
        }
        Command::Stop { .. } => {
            localdb.stop(instance).await?;
            info!("Stopped `{}`", paths::server_name(instance));
        }
        Command::Delete { directory, .. } => {
            let directory = directory
                .clone()
                .unwrap_or_else(|| settings.resolved_directory());
            localdb.stop_and_delete(instance).await?;
            remove_dir_if_exists(&directory)
                .await
                .with_context(|| format!("Failed to remove {}", directory.display()))?;
            info!(
                "Deleted `{}` and {}",
                paths::server_name(instance),
                directory.display()
            );
        }
        Command::Dir { .. } => {
            println!("{}", settings.resolved_directory().display());
        }
    }

    Ok(())
}
