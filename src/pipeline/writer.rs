use crate::config::types::WriterConfig;
use crate::pipeline::channel::{create_channel, Receiver, Sender};
use crate::source::message::Message;
use crate::storage::traits::{Storage, StorageError};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// A zero period would make the flush interval panic.
const MIN_FLUSH_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriterError {
    #[error("writer closed")]
    Closed,
}

/// Lifecycle of a writer. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Running,
    Closing,
    Closed,
}

/// Totals accumulated by the flush loop over the writer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    pub flushes: usize,
    pub failed_flushes: usize,
    pub documents_written: usize,
    pub documents_discarded: usize,
}

#[derive(Debug, Clone, Copy)]
enum FlushTrigger {
    Size,
    Timer,
    Close,
}

impl FlushTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Close => "close",
        }
    }
}

enum Inlet {
    Open(Sender<Message>),
    Closing,
    Closed,
}

enum Task {
    Running(JoinHandle<WriterStats>),
    Finished(WriterStats),
}

/// Buffers messages and upserts them to storage in batches.
///
/// A single background task owns the batch. It flushes when the batch
/// reaches `batch_size`, on every `flush_period` tick if the batch is not
/// empty, and once more when the queue closes. Failed flushes are logged and
/// the batch is discarded.
pub struct BatchWriter {
    inlet: Mutex<Inlet>,
    task: tokio::sync::Mutex<Task>,
}

impl BatchWriter {
    /// Spawn the flush loop and return a writer accepting messages.
    pub fn start(storage: Arc<dyn Storage>, config: &WriterConfig) -> Self {
        let (tx, rx) = create_channel(config.queue_capacity);
        let handle = tokio::spawn(run_flush_loop(
            rx,
            storage,
            config.batch_size.max(1),
            config.flush_period.max(MIN_FLUSH_PERIOD),
        ));

        Self {
            inlet: Mutex::new(Inlet::Open(tx)),
            task: tokio::sync::Mutex::new(Task::Running(handle)),
        }
    }

    /// Queue one message for the next flush.
    ///
    /// Returns `WriterError::Closed` without waiting once `close` has been
    /// called. Otherwise waits only while the queue is full.
    pub async fn save(&self, message: Message) -> Result<(), WriterError> {
        let sender = match &*self.lock_inlet() {
            Inlet::Open(tx) => tx.clone(),
            Inlet::Closing | Inlet::Closed => return Err(WriterError::Closed),
        };

        sender.send(message).await.map_err(|_| WriterError::Closed)
    }

    pub fn state(&self) -> WriterState {
        match &*self.lock_inlet() {
            Inlet::Open(_) => WriterState::Running,
            Inlet::Closing => WriterState::Closing,
            Inlet::Closed => WriterState::Closed,
        }
    }

    /// Close the queue and wait for the final flush.
    ///
    /// Only the first call closes the queue; every call waits until the
    /// flush loop has terminated and returns the same stats. Saves already
    /// waiting on a full queue when close begins are still delivered.
    pub async fn close(&self) -> WriterStats {
        {
            let mut inlet = self.lock_inlet();
            if matches!(*inlet, Inlet::Open(_)) {
                debug!("Closing batch writer");
                *inlet = Inlet::Closing;
            }
        }

        let mut task = self.task.lock().await;
        let stats = match &mut *task {
            Task::Finished(stats) => return *stats,
            Task::Running(handle) => match handle.await {
                Ok(stats) => stats,
                Err(e) => {
                    error!(error = %e, "Batch writer task failed");
                    WriterStats::default()
                }
            },
        };

        *task = Task::Finished(stats);
        *self.lock_inlet() = Inlet::Closed;
        stats
    }

    fn lock_inlet(&self) -> MutexGuard<'_, Inlet> {
        self.inlet.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run_flush_loop(
    mut input: Receiver<Message>,
    storage: Arc<dyn Storage>,
    batch_size: usize,
    flush_period: Duration,
) -> WriterStats {
    let mut batch: Vec<Message> = Vec::with_capacity(batch_size);
    let mut stats = WriterStats::default();

    // The first tick of a plain interval fires immediately; start one period out.
    let mut flush_interval = interval_at(Instant::now() + flush_period, flush_period);
    flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(batch_size, flush_period = ?flush_period, "Batch writer started");

    loop {
        tokio::select! {
            result = input.recv() => {
                match result {
                    Some(message) => {
                        batch.push(message);
                        if batch.len() >= batch_size {
                            flush(storage.as_ref(), &mut batch, &mut stats, FlushTrigger::Size).await;
                        }
                    }
                    None => {
                        info!("Writer queue closed, flushing remaining documents");
                        break;
                    }
                }
            }

            _ = flush_interval.tick() => {
                if !batch.is_empty() {
                    flush(storage.as_ref(), &mut batch, &mut stats, FlushTrigger::Timer).await;
                }
            }
        }
    }

    if !batch.is_empty() {
        flush(storage.as_ref(), &mut batch, &mut stats, FlushTrigger::Close).await;
    }

    info!(
        flushes = stats.flushes,
        failed_flushes = stats.failed_flushes,
        written = stats.documents_written,
        discarded = stats.documents_discarded,
        "Batch writer shutdown complete"
    );

    stats
}

async fn flush(
    storage: &dyn Storage,
    batch: &mut Vec<Message>,
    stats: &mut WriterStats,
    trigger: FlushTrigger,
) {
    let count = batch.len();
    stats.flushes += 1;

    match storage.bulk_upsert(&batch[..]).await {
        Ok(result) => {
            stats.documents_written += count;
            debug!(
                count,
                inserted = result.inserted,
                updated = result.updated,
                trigger = trigger.as_str(),
                "Flushed batch"
            );
        }
        Err(StorageError::BulkWrite {
            result, failures, ..
        }) => {
            stats.failed_flushes += 1;
            stats.documents_written += result.total();
            stats.documents_discarded += failures.len();
            for failure in &failures {
                warn!(uuid = %failure.uuid, error = %failure.error, "Document rejected by store");
            }
            error!(
                count,
                failed = failures.len(),
                trigger = trigger.as_str(),
                "Bulk write partially failed, rejected documents discarded"
            );
        }
        Err(e) => {
            stats.failed_flushes += 1;
            stats.documents_discarded += count;
            error!(count, error = %e, trigger = trigger.as_str(), "Bulk write failed, batch discarded");
        }
    }

    batch.clear();
}
