use super::traits::{
    BulkWriteResult, FindOptions, MessageField, MessageFilter, SortOrder, Storage, StorageError,
    WriteFailure,
};
use crate::source::message::Message;
use async_trait::async_trait;
use chrono::DateTime;
use duckdb::types::Value;
use duckdb::Connection;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// DuckDB implementation of the Storage trait
pub struct DuckDbStorage {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStorage {
    /// Open (or create) the database file at `path`.
    ///
    /// Any failure here is a connection failure: the caller must not start
    /// the pipeline.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Connection(format!(
                    "failed to create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            StorageError::Connection(format!("failed to open '{}': {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "Opened message store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory DuckDB storage instance (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StorageError> {
    conn.lock()
        .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
}

fn column(field: MessageField) -> &'static str {
    match field {
        MessageField::MessageId => "message_id",
        MessageField::Datetime => "datetime",
        MessageField::Group => "\"group\"",
        MessageField::Uuid => "uuid",
        MessageField::Tags => "tags",
    }
}

/// Raw row as read from DuckDB; tags are still JSON text.
struct MessageRow {
    uuid: String,
    message_id: String,
    datetime_us: i64,
    group: String,
    tags: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message, StorageError> {
        let datetime = DateTime::from_timestamp_micros(self.datetime_us).ok_or_else(|| {
            StorageError::Database(format!("invalid timestamp for {}", self.uuid))
        })?;
        Ok(Message {
            tags: serde_json::from_str(&self.tags)?,
            uuid: self.uuid,
            message_id: self.message_id,
            datetime,
            group: self.group,
        })
    }
}

fn upsert_one(conn: &Connection, message: &Message) -> Result<bool, StorageError> {
    let tags = serde_json::to_string(&message.tags)?;

    let existing: i64 = conn.query_row(
        "SELECT count(*) FROM messages WHERE uuid = ?",
        duckdb::params![message.uuid],
        |row| row.get(0),
    )?;

    // uuid is only written on insert; the conflict branch never touches it.
    conn.execute(
        "INSERT INTO messages (uuid, message_id, datetime, \"group\", tags)
         VALUES (?, ?, to_timestamp(? / 1000000.0), ?, ?)
         ON CONFLICT (uuid) DO UPDATE SET
            message_id = excluded.message_id,
            datetime = excluded.datetime,
            \"group\" = excluded.\"group\",
            tags = excluded.tags",
        duckdb::params![
            message.uuid,
            message.message_id,
            message.datetime.timestamp_micros(),
            message.group,
            tags,
        ],
    )?;

    Ok(existing == 0)
}

fn build_find_query(filter: &MessageFilter, options: &FindOptions) -> (String, Vec<Value>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(group) = &filter.group {
        clauses.push("\"group\" = ?");
        params.push(Value::Text(group.clone()));
    }
    if let Some(uuid) = &filter.uuid {
        clauses.push("uuid = ?");
        params.push(Value::Text(uuid.clone()));
    }
    if let Some(message_id) = &filter.message_id {
        clauses.push("message_id = ?");
        params.push(Value::Text(message_id.clone()));
    }
    if let Some(tag) = &filter.tag {
        // Tags are stored as a JSON array, so match the quoted element.
        clauses.push("contains(tags, ?)");
        params.push(Value::Text(
            serde_json::Value::String(tag.clone()).to_string(),
        ));
    }
    if let Some(from) = filter.from {
        clauses.push("datetime >= to_timestamp(? / 1000000.0)");
        params.push(Value::BigInt(from.timestamp_micros()));
    }
    if let Some(to) = filter.to {
        clauses.push("datetime <= to_timestamp(? / 1000000.0)");
        params.push(Value::BigInt(to.timestamp_micros()));
    }

    let mut sql = String::from(
        "SELECT uuid, message_id, epoch_us(datetime), \"group\", tags FROM messages",
    );
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    let direction = match options.order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    sql.push_str(&format!(
        " ORDER BY {} {}, uuid ASC LIMIT ? OFFSET ?",
        column(options.sort),
        direction
    ));
    params.push(Value::BigInt(options.limit as i64));
    params.push(Value::BigInt(options.offset as i64));

    (sql, params)
}

#[async_trait]
impl Storage for DuckDbStorage {
    async fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS messages (
                    uuid VARCHAR PRIMARY KEY,
                    message_id VARCHAR NOT NULL,
                    datetime TIMESTAMPTZ NOT NULL,
                    \"group\" VARCHAR NOT NULL,
                    tags VARCHAR NOT NULL
                )",
                [],
            )
            .map_err(|e| StorageError::Connection(format!("schema setup failed: {}", e)))?;

            Ok::<(), StorageError>(())
        })
        .await
        .map_err(|e| StorageError::Database(format!("Task join error: {}", e)))?
    }

    async fn bulk_upsert(&self, messages: &[Message]) -> Result<BulkWriteResult, StorageError> {
        if messages.is_empty() {
            return Ok(BulkWriteResult::default());
        }

        let conn = self.conn.clone();
        let messages = messages.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut result = BulkWriteResult::default();
            let mut failures = Vec::new();

            for message in &messages {
                match upsert_one(&conn, message) {
                    Ok(true) => result.inserted += 1,
                    Ok(false) => result.updated += 1,
                    Err(e) => failures.push(WriteFailure {
                        uuid: message.uuid.clone(),
                        error: e.to_string(),
                    }),
                }
            }

            if failures.is_empty() {
                Ok(result)
            } else {
                Err(StorageError::BulkWrite {
                    attempted: messages.len(),
                    result,
                    failures,
                })
            }
        })
        .await
        .map_err(|e| StorageError::Database(format!("Task join error: {}", e)))?
    }

    async fn find(
        &self,
        filter: &MessageFilter,
        options: &FindOptions,
    ) -> Result<Vec<Message>, StorageError> {
        let conn = self.conn.clone();
        let (sql, params) = build_find_query(filter, options);

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(&sql)?;

            let rows = stmt.query_map(duckdb::params_from_iter(params), |row| {
                Ok(MessageRow {
                    uuid: row.get(0)?,
                    message_id: row.get(1)?,
                    datetime_us: row.get(2)?,
                    group: row.get(3)?,
                    tags: row.get(4)?,
                })
            })?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?.into_message()?);
            }
            Ok(messages)
        })
        .await
        .map_err(|e| StorageError::Database(format!("Task join error: {}", e)))?
    }

    async fn distinct_values(&self, field: MessageField) -> Result<BTreeSet<String>, StorageError> {
        if field == MessageField::Datetime {
            return Err(StorageError::UnknownField(field.to_string()));
        }

        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let sql = format!("SELECT DISTINCT {} FROM messages", column(field));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

            let mut values = BTreeSet::new();
            for row in rows {
                let value = row?;
                if field == MessageField::Tags {
                    let tags: Vec<String> = serde_json::from_str(&value)?;
                    values.extend(tags);
                } else {
                    values.insert(value);
                }
            }
            Ok(values)
        })
        .await
        .map_err(|e| StorageError::Database(format!("Task join error: {}", e)))?
    }
}
