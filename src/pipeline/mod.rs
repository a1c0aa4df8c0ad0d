pub mod channel;
pub mod runner;
pub mod writer;

pub use channel::{create_channel, Receiver, Sender};
pub use runner::{run_ingest, IngestReport, PipelineError, ProcessReport, Processor};
pub use writer::{BatchWriter, WriterError, WriterState, WriterStats};
