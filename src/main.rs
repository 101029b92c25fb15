use anyhow::{Context, Result};
use env_logger::Env;
use log::{debug, info};

use motion_connector::cli::{build_cli, handle_subcommands};
use motion_connector::config::Configuration;
use motion_connector::services::{Connector, Publisher};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let default_level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let config_path = matches
        .get_one::<String>("config")
        .context("No configuration file given")?;
    let mut config = Configuration::load(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    config.apply_overrides(&matches)?;
    debug!("🔧 Effective settings: {:?}", config.settings);

    let connector = Connector::new(config)?;
    info!("🖥️  Motion Connector v{} -> {}", motion_connector::VERSION, connector.connector_address());

    let mut publisher = Publisher::new();
    if !handle_subcommands(&matches, &connector, &mut publisher).await? {
        build_cli().print_help()?;
    }
    Ok(())
}
