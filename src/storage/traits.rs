use crate::source::message::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn init_schema(&self) -> Result<(), StorageError>;

    /// Upsert every message keyed by `uuid`, unordered.
    ///
    /// A document that fails does not stop its siblings; failures are
    /// reported through `StorageError::BulkWrite` together with the partial
    /// result.
    async fn bulk_upsert(&self, messages: &[Message]) -> Result<BulkWriteResult, StorageError>;

    async fn find(
        &self,
        filter: &MessageFilter,
        options: &FindOptions,
    ) -> Result<Vec<Message>, StorageError>;

    async fn distinct_values(&self, field: MessageField) -> Result<BTreeSet<String>, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown or unsupported field: {0}")]
    UnknownField(String),

    #[error("bulk write failed for {} of {attempted} documents", failures.len())]
    BulkWrite {
        attempted: usize,
        result: BulkWriteResult,
        failures: Vec<WriteFailure>,
    },
}

impl From<duckdb::Error> for StorageError {
    fn from(e: duckdb::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

/// Outcome of one bulk upsert call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkWriteResult {
    pub inserted: usize,
    pub updated: usize,
}

impl BulkWriteResult {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub uuid: String,
    pub error: String,
}

/// Fields of a stored message that can be sorted on or enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageField {
    MessageId,
    Datetime,
    Group,
    Uuid,
    Tags,
}

impl MessageField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageField::MessageId => "message_id",
            MessageField::Datetime => "datetime",
            MessageField::Group => "group",
            MessageField::Uuid => "uuid",
            MessageField::Tags => "tags",
        }
    }
}

impl fmt::Display for MessageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageField {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message_id" => Ok(MessageField::MessageId),
            "datetime" => Ok(MessageField::Datetime),
            "group" => Ok(MessageField::Group),
            "uuid" => Ok(MessageField::Uuid),
            "tags" => Ok(MessageField::Tags),
            other => Err(StorageError::UnknownField(other.to_string())),
        }
    }
}

/// Equality and range constraints for `Storage::find`. Unset fields match
/// everything; `from`/`to` are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub group: Option<String>,
    pub uuid: Option<String>,
    pub message_id: Option<String>,
    pub tag: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: MessageField,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            sort: MessageField::Datetime,
            order: SortOrder::Asc,
            limit: 100,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field() {
        let err = "author".parse::<MessageField>().unwrap_err();
        assert!(matches!(err, StorageError::UnknownField(name) if name == "author"));
    }

    #[test]
    fn test_bulk_write_error_message() {
        let err = StorageError::BulkWrite {
            attempted: 3,
            result: BulkWriteResult { inserted: 2, updated: 0 },
            failures: vec![WriteFailure {
                uuid: "u".to_string(),
                error: "boom".to_string(),
            }],
        };
        assert_eq!(err.to_string(), "bulk write failed for 1 of 3 documents");
    }
}
