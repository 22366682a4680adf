//! Clarify application binary - composition root.
//!
//! 1. Parse the command line and load configuration from TOML
//! 2. Build the collaborators (extractor, FAQ, small talk, backend)
//! 3. Serve WebSocket sessions, or chat on the terminal with `--console`

mod cli;
mod console;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use clarify_api::state::AppState;
use clarify_core::config::ClarifyConfig;
use clarify_dialog::Collaborators;

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let loaded = ClarifyConfig::load(&config_file);

    // Tracing: RUST_LOG > --log-level > config file > info.
    let level = args
        .resolve_log_level()
        .or_else(|| loaded.as_ref().ok().map(|c| c.general.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)))
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Clarify v{}", env!("CARGO_PKG_VERSION"));

    if args.init_config {
        if config_file.exists() {
            return Err(format!("{} already exists", config_file.display()).into());
        }
        ClarifyConfig::default().save(&config_file)?;
        return Ok(());
    }

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Using default configuration");
            ClarifyConfig::default()
        }
    };
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }
    config.server.port = args.resolve_port(config.server.port);

    let collaborators = Collaborators::from_config(&config)?;

    if args.console {
        let outcome = console::run(&config, collaborators).await;
        tracing::info!(outcome = ?outcome, "Console session ended");
        return Ok(());
    }

    let state = AppState::new(config.clone(), collaborators);
    tracing::info!(
        addr = %format!("{}:{}", config.server.host, config.server.port),
        "Chat socket at /ws"
    );
    clarify_api::start_server(&config, state).await?;

    Ok(())
}
