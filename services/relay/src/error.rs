//! Error types for tcp-relay.

use thiserror::Error;

/// Main error type for tcp-relay.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        source: std::io::Error,
    },

    #[error("proxy already started")]
    AlreadyRunning,

    #[error("shutdown already in progress")]
    AlreadyClosing,

    #[error("shutdown deadline exceeded")]
    DeadlineExceeded,
}

/// Result type alias for tcp-relay.
pub type Result<T> = std::result::Result<T, Error>;
