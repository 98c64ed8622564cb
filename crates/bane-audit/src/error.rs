// error.rs — Error types for BANE stores.
//
// Store errors never reach an evaluation caller: the AuditSink logs and
// discards them. They are still typed so store implementations and operator
// tooling can report what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting or reading BANE records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open, create, or write a backing file.
    #[error("store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A record could not be serialized or a stored line was malformed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store does not implement an optional capability (e.g. incidents).
    #[error("store does not support {0}")]
    Unsupported(&'static str),

    /// The backing service is unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
