use std::io;

use thiserror::Error;

/// Result type for LASH operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a LASH daemon or running the loader
#[derive(Error, Debug)]
pub enum Error {
    #[error("could not resolve host '{host}', service '{service}': {reason}")]
    ResolutionFailed {
        host: String,
        service: String,
        reason: String,
    },

    #[error("could not connect to host '{host}', service '{service}'")]
    ConnectFailed { host: String, service: String },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("transport protocol version mismatch: expected {expected}, found {found}")]
    TransportVersionMismatch { expected: u32, found: u32 },

    #[error("unknown message type {0}")]
    UnknownMessage(u32),

    #[error("not connected to a LASH server")]
    NotConnected,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("could not create loader socket pair: {0}")]
    LoaderSetup(#[source] io::Error),

    #[error("fork failed: {0}")]
    ForkFailed(String),

    #[error("could not execute program '{program}': {source}")]
    ExecFailed {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        Self::MalformedMessage(what.into())
    }

    /// Whether this error means the peer is gone for good
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::Io(_)
                | Self::MalformedMessage(_)
                | Self::TransportVersionMismatch { .. }
        )
    }
}
