use crate::config::parse::load_config;
use crate::connector::Connector;
use std::path::PathBuf;
use thiserror::Error;
use tokio::signal;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("connector error: {0}")]
    Connector(#[from] crate::connector::ConnectorError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/logship/config.yml");
            eprintln!("  /etc/logship/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'logship config init' to generate one.");
            std::process::exit(1);
        }
    };

    run_connector(&config_path).await.map_err(|e| e.into())
}

async fn run_connector(config_path: &PathBuf) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");

    let config = load_config(config_path)?;

    info!(
        store = %config.store.base_url,
        path = %config.store.path,
        "Starting connector"
    );
    let mut connector = Connector::from_config(&config)?;

    let mut log_interval = tokio::time::interval(config.connector.log_poll_interval);
    let mut record_interval = tokio::time::interval(config.connector.record_poll_interval);

    // Both intervals fire immediately on startup, then on their cadence.
    // The branches share the connector, so cycles never overlap.
    loop {
        tokio::select! {
            _ = log_interval.tick() => {
                connector.run_log_cycle().await;
            }
            _ = record_interval.tick() => {
                connector.run_record_cycle().await;
            }
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal, stopping");
                break;
            }
        }
    }

    Ok(())
}
