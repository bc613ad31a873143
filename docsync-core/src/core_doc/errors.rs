/*
    errors.rs - Error types for the reference document
*/

use thiserror::Error;

/// Errors that can occur while encoding or applying document state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocError {
    /// Update or state vector bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Local state could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),
}

/// Result type for document operations
pub type DocResult<T> = Result<T, DocError>;
