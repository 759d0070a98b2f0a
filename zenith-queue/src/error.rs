//! Error types for the dispatch queue

use std::io;

use thiserror::Error;

use crate::job::LeaseToken;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// The lease was never issued, was already settled, or expired and the
    /// job was handed to someone else
    #[error("Unknown or expired lease: {0}")]
    UnknownLease(LeaseToken),

    #[error("Invalid queue configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

impl From<bincode::error::EncodeError> for QueueError {
    fn from(e: bincode::error::EncodeError) -> Self {
        Self::Serialization(e.into())
    }
}

impl From<bincode::error::DecodeError> for QueueError {
    fn from(e: bincode::error::DecodeError) -> Self {
        Self::Serialization(e.into())
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: QueueError = io::Error::new(io::ErrorKind::PermissionDenied, "access denied").into();
        assert!(matches!(err, QueueError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
