//! Error types for snapshot persistence.

use thiserror::Error;

/// Errors returned while reading or writing the persisted snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// Reading, writing or syncing the file failed.
    #[error("snapshot I/O failed for {path}: {message}")]
    Io {
        /// File involved in the failed operation.
        path: String,
        /// Error detail from the underlying I/O operation.
        message: String,
    },

    /// The snapshot could not be encoded or decoded.
    #[error("snapshot at {path} is not valid JSON: {message}")]
    Json {
        /// File involved in the failed operation.
        path: String,
        /// Error detail from `serde_json`.
        message: String,
    },
}
