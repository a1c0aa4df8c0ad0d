pub mod config;
pub mod save;
pub mod serve;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config not found; searched ~/.config/tgtag/config.yml and /etc/tgtag/config.yml (use --config <path> or run 'tgtag config init')")]
    ConfigNotFound,

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("parser error: {0}")]
    Parser(#[from] crate::source::ParseError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("web server error: {0}")]
    WebServer(String),
}

fn require_config_path(config_path: Option<PathBuf>) -> Result<PathBuf, RunError> {
    config_path.ok_or(RunError::ConfigNotFound)
}
