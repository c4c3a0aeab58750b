//! Snapshot persistence for warm restarts.
//!
//! The worker writes its canonical set to a JSON file after every successful
//! cycle and reads it once at construction. Persistence is best effort: a
//! missing or corrupt file only forgoes the warm start.

mod error;
mod snapshot_file;

pub use error::PersistenceError;
pub use snapshot_file::{PersistedSnapshot, SnapshotFile, default_snapshot_path};
