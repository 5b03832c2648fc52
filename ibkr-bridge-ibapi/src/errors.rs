//! Error types for the ibkr-bridge-ibapi wire client.

use thiserror::Error;

/// Top-level error type for the wire client.
#[derive(Debug, Error)]
pub enum IBApiError {
    /// TCP connection failure or socket error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Failed to encode a request message.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a response message.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Protocol-level error (version mismatch, redirect, bad frame length).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection was closed by the peer or by `disconnect()`.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for this crate.
pub type Result<T> = std::result::Result<T, IBApiError>;
