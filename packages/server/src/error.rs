//! Error types for the exchange server.

use std::io;

use thiserror::Error;

/// Server startup and accept-loop errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither an explicit port nor a host name to derive one from
    #[error("no port given and none could be derived from the host name")]
    NoPort,
}

/// Outbound queue errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SenderError {
    /// The drain task has already ended
    #[error("sender '{0}' has already terminated")]
    Terminated(String),
}
