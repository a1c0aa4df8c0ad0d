use super::{require_config_path, RunError};
use crate::config::load_config;
use crate::storage::duckdb::DuckDbStorage;
use crate::storage::{MessageRepository, Storage};
use crate::web::run_server;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// `tgtag serve`: expose stored messages over HTTP until Ctrl+C.
pub async fn run(config_path: Option<PathBuf>) -> Result<(), RunError> {
    let config_path = require_config_path(config_path)?;
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(&config_path)?;

    let storage: Arc<dyn Storage> = Arc::new(DuckDbStorage::new(&config.store.path)?);
    storage.init_schema().await?;
    let repository = MessageRepository::new(storage, config.writer.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_config = config.server.clone();
    let mut server = tokio::spawn(async move {
        run_server(repository, server_config, shutdown_rx)
            .await
            .map_err(|e| RunError::WebServer(e.to_string()))
    });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
        result = &mut server => {
            return match result {
                Ok(result) => result,
                Err(e) => Err(RunError::WebServer(e.to_string())),
            };
        }
    }

    match server.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Web server task join error");
            Err(RunError::WebServer(e.to_string()))
        }
    }
}
