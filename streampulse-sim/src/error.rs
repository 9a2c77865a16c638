//! Error types for the producing side.

use thiserror::Error;

/// Errors raised while emitting or serving stream messages.
#[derive(Debug, Error)]
pub enum SimError {
    /// Socket or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be encoded as JSON.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The output channel's receiver is gone.
    #[error("Output channel closed")]
    ChannelClosed,
}

/// Reasons a batch is rejected before any event is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("Batch must contain at least one event")]
    EmptyBatch,

    #[error("Batch size {size} exceeds maximum of {max} events")]
    BatchTooLarge { size: usize, max: usize },

    /// The request body is not a valid batch.
    #[error("Invalid batch: {0}")]
    Malformed(String),
}
