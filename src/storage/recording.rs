use super::traits::{
    BulkWriteResult, FindOptions, MessageField, MessageFilter, Storage, StorageError,
};
use crate::source::message::Message;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

/// Storage double that records every bulk upsert call.
///
/// The first `fail_first` calls are recorded and then rejected. With a
/// `delay`, every call is recorded up front and completes after the delay.
#[derive(Default)]
pub struct RecordingStorage {
    calls: Mutex<Vec<Vec<Message>>>,
    fail_first: usize,
    delay: Option<Duration>,
}

impl RecordingStorage {
    pub fn failing_first(fail_first: usize) -> Self {
        Self {
            fail_first,
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn init_schema(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn bulk_upsert(&self, messages: &[Message]) -> Result<BulkWriteResult, StorageError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.to_vec());
            calls.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if attempt <= self.fail_first {
            return Err(StorageError::Database("injected failure".to_string()));
        }
        Ok(BulkWriteResult {
            inserted: messages.len(),
            updated: 0,
        })
    }

    async fn find(
        &self,
        _filter: &MessageFilter,
        _options: &FindOptions,
    ) -> Result<Vec<Message>, StorageError> {
        Ok(self.calls().into_iter().flatten().collect())
    }

    async fn distinct_values(&self, field: MessageField) -> Result<BTreeSet<String>, StorageError> {
        Err(StorageError::UnknownField(field.to_string()))
    }
}
