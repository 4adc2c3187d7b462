//! Error types for reading and writing frames.

use std::io;

use thiserror::Error;

/// A frame that cannot be decoded. There is no way to resynchronize to the
/// next frame boundary, so the stream is unusable afterwards.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload ended before the declared size was reached
    #[error("truncated payload: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    /// Stream ended inside the metadata block
    #[error("stream ended inside metadata after {0} bytes")]
    UnterminatedMetadata(usize),

    /// No terminator within the metadata length limit
    #[error("metadata exceeds {limit} bytes without a terminator")]
    MetadataTooLarge { limit: usize },

    /// Metadata is not valid JSON
    #[error("invalid metadata JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Metadata is valid JSON but not an object
    #[error("metadata must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// `size` is present but not a non-negative integer
    #[error("invalid size field: {0}")]
    InvalidSize(String),
}

/// Terminal condition while reading a frame from a stream.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer reset the connection. Kept apart from [`ReadError::Io`] so it
    /// can be logged quietly.
    #[error("connection reset by peer: {0}")]
    ConnectionReset(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl ReadError {
    pub fn is_peer_reset(&self) -> bool {
        matches!(self, ReadError::ConnectionReset(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, ReadError::Protocol(_))
    }
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                ReadError::ConnectionReset(e)
            }
            _ => ReadError::Io(e),
        }
    }
}
