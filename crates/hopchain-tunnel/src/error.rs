//! Error types for the tunnel crate.

use std::path::PathBuf;

use hopchain_core::io::RelayError;
use hopchain_core::{
    ERROR_CONFIG, ERROR_COPY, ERROR_CREDENTIAL, ERROR_DIAL, ERROR_HANDSHAKE, ERROR_IO, ERROR_PROBE,
    ERROR_TIMEOUT,
};
use thiserror::Error;

/// Errors that can occur while building, checking or using a hop chain.
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("unable to load private key {path:?}: {reason}")]
    Credential { path: PathBuf, reason: String },

    #[error("dial {addr}: {reason}")]
    Dial { addr: String, reason: String },

    #[error("handshake with {addr} failed: {reason}")]
    Handshake { addr: String, reason: String },

    #[error("connect timeout to {0}")]
    ConnectTimeout(String),

    #[error("liveness probe failed: {0}")]
    Probe(String),

    /// A chain build stopped at hop `index`.
    #[error("hop {index} ({addr}): {source}")]
    Hop {
        index: usize,
        addr: String,
        #[source]
        source: Box<TunnelError>,
    },

    #[error("copy {0}")]
    Copy(#[from] RelayError),

    #[error("close failed: {0}")]
    Close(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),
}

impl TunnelError {
    /// Get the error class string for log fields.
    pub fn error_type(&self) -> &'static str {
        match self {
            TunnelError::Io(_) | TunnelError::Close(_) => ERROR_IO,
            TunnelError::Config(_) => ERROR_CONFIG,
            TunnelError::Credential { .. } => ERROR_CREDENTIAL,
            TunnelError::Dial { .. } => ERROR_DIAL,
            TunnelError::Handshake { .. } | TunnelError::Ssh(_) => ERROR_HANDSHAKE,
            TunnelError::ConnectTimeout(_) => ERROR_TIMEOUT,
            TunnelError::Probe(_) => ERROR_PROBE,
            TunnelError::Hop { source, .. } => source.error_type(),
            TunnelError::Copy(_) => ERROR_COPY,
        }
    }

    /// Whether the error is fatal at startup rather than contained to one session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TunnelError::Config(_) | TunnelError::Credential { .. })
    }
}
