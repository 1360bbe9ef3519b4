pub mod manager;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use manager::{RecordSink, StorageBackend};
