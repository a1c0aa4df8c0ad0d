pub mod duckdb;
pub mod repository;
pub mod traits;

#[cfg(test)]
pub(crate) mod recording;

pub use repository::{MessageRepository, UpsertHandle};
pub use traits::{
    BulkWriteResult, FindOptions, MessageField, MessageFilter, SortOrder, Storage, StorageError,
    WriteFailure,
};
