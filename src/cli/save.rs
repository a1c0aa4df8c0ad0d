use super::{require_config_path, RunError};
use crate::config::load_config;
use crate::pipeline::{run_ingest, IngestReport};
use crate::source::TelegramHtmlParser;
use crate::storage::duckdb::DuckDbStorage;
use crate::storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// `tgtag save`: ingest every archive under `system.data_path` into the store.
pub async fn run(config_path: Option<PathBuf>) -> Result<IngestReport, RunError> {
    let config_path = require_config_path(config_path)?;
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(&config_path)?;

    // A store that cannot be opened is fatal: nothing is discovered or parsed.
    info!(path = %config.store.path.display(), "Connecting to message store");
    let storage: Arc<dyn Storage> = Arc::new(DuckDbStorage::new(&config.store.path)?);
    storage.init_schema().await?;

    let parser = Arc::new(TelegramHtmlParser::new()?);

    info!(data_path = %config.system.data_path.display(), "Starting ingestion");
    let report = run_ingest(&config, storage, parser).await?;

    info!(
        files = report.files_discovered,
        traversal_errors = report.traversal_errors,
        files_failed = report.process.files_failed,
        messages = report.process.messages_forwarded,
        written = report.process.writer.documents_written,
        discarded = report.process.writer.documents_discarded,
        "All messages have been processed"
    );

    Ok(report)
}
