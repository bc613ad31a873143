/*
    errors.rs - Error types for the sync provider

    Only lifecycle misuse is reported to callers of connect/disconnect.
    Codec and document failures on inbound traffic are logged and dropped
    by the router; they surface as values here so handlers can use `?`.
*/

use thiserror::Error;

use super::codec::CodecError;
use crate::core_doc::DocError;

/// Errors that can occur in the sync provider
#[derive(Debug, Error)]
pub enum SyncError {
    /// connect() called on a connected provider
    #[error("Already connected")]
    AlreadyConnected,

    /// disconnect() called on a provider that is not connected
    #[error("Not connected")]
    NotConnected,

    /// Publish/subscribe failure reported by the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed protocol envelope
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Document rejected an update or state vector
    #[error("Document error: {0}")]
    Document(#[from] DocError),

    /// Message could not be (de)serialized
    #[error("Message error: {0}")]
    Message(String),

    /// Event loop terminated unexpectedly
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Lifecycle errors indicate a bug in the owning component
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, SyncError::AlreadyConnected | SyncError::NotConnected)
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_classification() {
        assert!(SyncError::AlreadyConnected.is_lifecycle());
        assert!(SyncError::NotConnected.is_lifecycle());
        assert!(!SyncError::Transport("down".into()).is_lifecycle());
    }

    #[test]
    fn test_codec_error_converts() {
        let err: SyncError = CodecError::UnknownProtocol(9).into();
        assert_eq!(err.to_string(), "Codec error: unknown protocol type 9");
    }
}
