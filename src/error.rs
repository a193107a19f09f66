use thiserror::Error;

use crate::buffer::BufferId;
use crate::segment::TrackType;

/// Main error type for the virtual media source
#[derive(Error, Debug)]
pub enum MediaSourceError {
    /// An operation was attempted in a state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The native sink rejected an append
    #[error("Append to {track} sink failed: {source}")]
    Append {
        track: TrackType,
        #[source]
        source: SinkError,
    },

    /// The native media source refused to create a sink
    #[error("Failed to create sink for {mime}: {source}")]
    SinkCreate {
        mime: String,
        #[source]
        source: SinkError,
    },

    /// A remove or abort on a native sink failed
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// A byte window does not fit inside its backing buffer
    #[error("Invalid byte range: offset={offset}, length={length}, available={available}")]
    InvalidByteRange {
        offset: usize,
        length: usize,
        available: usize,
    },

    /// No virtual buffer is registered under this id
    #[error("Unknown buffer: {0}")]
    UnknownBuffer(BufferId),

    /// The worker channel has been closed
    #[error("Transmux worker is closed")]
    WorkerClosed,

    /// The worker thread could not be started
    #[error("Failed to spawn transmux worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by native sink implementations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("operation rejected: {0}")]
    Rejected(String),

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("type not supported: {0}")]
    NotSupported(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MediaSourceError>;
