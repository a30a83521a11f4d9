//! Storage contracts and persisted-key schema for the trellis slice
//! coordinator.
//!
//! The production database is an external collaborator reached through the
//! [`KeyValueStore`] contract; [`MemoryStore`] is the process-local
//! implementation. [`schema`] provides typed readers and writers for exactly
//! the keys the coordinator persists.

mod error;
pub use error::{SourceError, StorageError};

mod kv;
pub use kv::{KeyValueStore, MemoryStore, WriteBatch};

pub mod schema;
