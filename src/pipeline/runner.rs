use crate::config::types::Config;
use crate::pipeline::channel::{create_channel, Receiver, Sender};
use crate::pipeline::writer::WriterStats;
use crate::source::finder::spawn_finder;
use crate::source::message::Message;
use crate::source::parser::{ArchiveParser, ParseError};
use crate::storage::repository::MessageRepository;
use crate::storage::traits::{Storage, StorageError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Errors that can occur during pipeline operation
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("message channel closed before the stream ended")]
    ChannelSend,

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// What the processor saw between its first filename and the writer's final flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub files_parsed: usize,
    pub files_failed: usize,
    pub messages_forwarded: usize,
    pub writer: WriterStats,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files_discovered: usize,
    pub traversal_errors: usize,
    pub process: ProcessReport,
}

/// Parses archive files and forwards their messages to a batch writer.
pub struct Processor {
    parser: Arc<dyn ArchiveParser>,
    repository: MessageRepository,
    messages_buffer: usize,
}

impl Processor {
    pub fn new(
        parser: Arc<dyn ArchiveParser>,
        repository: MessageRepository,
        messages_buffer: usize,
    ) -> Self {
        Self {
            parser,
            repository,
            messages_buffer,
        }
    }

    /// Process every filename until the channel closes.
    ///
    /// Returns only after the writer has drained and made its final flush
    /// attempt, so a completed run never leaves accepted messages unflushed.
    /// A file that fails to parse is logged and skipped.
    pub async fn run(&self, mut filenames: Receiver<PathBuf>) -> Result<ProcessReport, PipelineError> {
        let (messages_tx, messages_rx) = create_channel::<Message>(self.messages_buffer);
        let upsert = self.repository.spawn_upsert(messages_rx);

        info!("Processor started");

        let mut report = ProcessReport::default();
        let forwarded = self.forward_all(&mut filenames, &messages_tx, &mut report).await;

        // Closing the message channel is the writer's end-of-stream signal.
        drop(messages_tx);
        info!("Filename channel closed, waiting for writer to drain");

        report.writer = upsert.wait().await?;
        forwarded?;

        info!(
            files_parsed = report.files_parsed,
            files_failed = report.files_failed,
            messages = report.messages_forwarded,
            "Processor shutdown complete"
        );

        Ok(report)
    }

    async fn forward_all(
        &self,
        filenames: &mut Receiver<PathBuf>,
        output: &Sender<Message>,
        report: &mut ProcessReport,
    ) -> Result<(), PipelineError> {
        while let Some(filename) = filenames.recv().await {
            let messages = match self.parse(filename.clone()).await {
                Ok(messages) => messages,
                Err(e) => {
                    error!(filename = %filename.display(), error = %e, "Error processing file");
                    report.files_failed += 1;
                    continue;
                }
            };

            debug!(filename = %filename.display(), count = messages.len(), "Parsed file");
            report.files_parsed += 1;

            for message in messages {
                output
                    .send(message)
                    .await
                    .map_err(|_| PipelineError::ChannelSend)?;
                report.messages_forwarded += 1;
            }
        }

        Ok(())
    }

    async fn parse(&self, filename: PathBuf) -> Result<Vec<Message>, ParseError> {
        let parser = self.parser.clone();
        tokio::task::spawn_blocking(move || parser.parse_file(&filename))
            .await
            .map_err(|e| ParseError::Task(e.to_string()))?
    }
}

/// Run one full ingestion: discover files under `config.system.data_path`,
/// parse them and upsert every message.
pub async fn run_ingest(
    config: &Config,
    storage: Arc<dyn Storage>,
    parser: Arc<dyn ArchiveParser>,
) -> Result<IngestReport, PipelineError> {
    let (files_tx, files_rx) = create_channel::<PathBuf>(config.pipeline.filenames_buffer);
    let finder = spawn_finder(
        config.system.data_path.clone(),
        config.system.extensions.clone(),
        files_tx,
    );

    let repository = MessageRepository::new(storage, config.writer.clone());
    let processor = Processor::new(parser, repository, config.pipeline.messages_buffer);

    let processed = processor.run(files_rx).await;
    let discovery = finder.wait().await?;
    let process = processed?;

    Ok(IngestReport {
        files_discovered: discovery.files,
        traversal_errors: discovery.errors,
        process,
    })
}
