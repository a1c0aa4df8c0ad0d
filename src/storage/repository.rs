use super::traits::{FindOptions, MessageField, MessageFilter, Storage, StorageError};
use crate::config::types::WriterConfig;
use crate::pipeline::channel::Receiver;
use crate::pipeline::writer::{BatchWriter, WriterStats};
use crate::source::message::Message;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Message-level access to a `Storage` backend: batched ingestion for the
/// pipeline and read queries for the web API.
#[derive(Clone)]
pub struct MessageRepository {
    storage: Arc<dyn Storage>,
    writer_config: WriterConfig,
}

/// Handle to a running `upsert_many` drain.
pub struct UpsertHandle {
    task: JoinHandle<WriterStats>,
}

impl UpsertHandle {
    /// Wait until the input stream has ended and the writer has closed.
    pub async fn wait(self) -> Result<WriterStats, tokio::task::JoinError> {
        self.task.await
    }
}

impl MessageRepository {
    pub fn new(storage: Arc<dyn Storage>, writer_config: WriterConfig) -> Self {
        Self {
            storage,
            writer_config,
        }
    }

    /// Start a batch writer and drain `messages` into it in the background.
    ///
    /// The writer's flush loop is running when this returns. The handle
    /// resolves once `messages` has closed and the writer's final flush has
    /// completed.
    pub fn spawn_upsert(&self, mut messages: Receiver<Message>) -> UpsertHandle {
        let writer = BatchWriter::start(self.storage.clone(), &self.writer_config);

        let task = tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                let uuid = message.uuid.clone();
                if let Err(e) = writer.save(message).await {
                    error!(uuid = %uuid, error = %e, "Failed to queue message");
                }
            }

            let stats = writer.close().await;
            debug!(written = stats.documents_written, "Message stream fully saved");
            stats
        });

        UpsertHandle { task }
    }

    /// Consume `messages` to completion. Flush failures are logged by the
    /// writer and only show up in the returned stats.
    pub async fn upsert_many(&self, messages: Receiver<Message>) -> WriterStats {
        match self.spawn_upsert(messages).wait().await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Upsert task failed");
                WriterStats::default()
            }
        }
    }

    pub async fn find(
        &self,
        filter: &MessageFilter,
        options: &FindOptions,
    ) -> Result<Vec<Message>, StorageError> {
        self.storage.find(filter, options).await
    }

    pub async fn get_groups(&self) -> Result<BTreeSet<String>, StorageError> {
        self.storage.distinct_values(MessageField::Group).await
    }

    pub async fn get_unique_values(&self, field_name: &str) -> Result<BTreeSet<String>, StorageError> {
        let field: MessageField = field_name.parse()?;
        self.storage.distinct_values(field).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::create_channel;
    use crate::storage::duckdb::DuckDbStorage;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn message(group: &str, id: &str, tags: &[&str]) -> Message {
        Message {
            message_id: id.to_string(),
            datetime: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            group: group.to_string(),
            uuid: Message::derive_uuid(group, id),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    async fn repository() -> MessageRepository {
        let storage = DuckDbStorage::in_memory().unwrap();
        storage.init_schema().await.unwrap();
        MessageRepository::new(
            Arc::new(storage),
            WriterConfig {
                batch_size: 2,
                flush_period: Duration::from_secs(3600),
                queue_capacity: 4,
            },
        )
    }

    #[tokio::test]
    async fn test_upsert_many_persists_whole_stream() {
        let repo = repository().await;
        let (tx, rx) = create_channel(1);

        let producer = tokio::spawn(async move {
            for n in 0..5 {
                tx.send(message("g", &n.to_string(), &[])).await.unwrap();
            }
        });

        let stats = repo.upsert_many(rx).await;
        producer.await.unwrap();

        assert_eq!(stats.documents_written, 5);
        let stored = repo
            .find(&MessageFilter::default(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 5);
    }

    #[tokio::test]
    async fn test_reingestion_converges_per_uuid() {
        let repo = repository().await;

        let (tx, rx) = create_channel(4);
        tx.send(message("g", "1", &["a"])).await.unwrap();
        drop(tx);
        repo.upsert_many(rx).await;

        let (tx, rx) = create_channel(4);
        tx.send(message("g", "1", &["a", "b"])).await.unwrap();
        drop(tx);
        repo.upsert_many(rx).await;

        let stored = repo
            .find(&MessageFilter::default(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_groups_and_unique_values() {
        let repo = repository().await;
        let (tx, rx) = create_channel(4);
        tx.send(message("rust", "1", &["help"])).await.unwrap();
        tx.send(message("go", "2", &["news"])).await.unwrap();
        drop(tx);
        repo.upsert_many(rx).await;

        let groups = repo.get_groups().await.unwrap();
        assert_eq!(groups.into_iter().collect::<Vec<_>>(), vec!["go", "rust"]);

        let tags = repo.get_unique_values("tags").await.unwrap();
        assert!(tags.contains("help") && tags.contains("news"));

        let err = repo.get_unique_values("author").await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownField(_)));
    }
}
