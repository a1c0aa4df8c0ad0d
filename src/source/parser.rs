use crate::source::message::Message;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed archive: {0}")]
    Malformed(String),

    #[error("parser task failed: {0}")]
    Task(String),
}

/// Turns one exported archive file into zero or more messages.
///
/// Implementations are called from a blocking task, one file at a time.
/// Records must be returned in the order they appear in the file.
pub trait ArchiveParser: Send + Sync {
    fn parse_file(&self, path: &Path) -> Result<Vec<Message>, ParseError>;
}
