//! Bridge error type.
//!
//! None of these cross the tool boundary as a fault: the facade renders every
//! one of them as `{"error": "<display text>"}`.

use ibkr_bridge_ibapi::IBApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Every configured endpoint refused the session or never became ready.
    /// `attempted` holds the endpoint labels in the order they were tried.
    #[error("Could not connect to IBKR. Make sure TWS or IB Gateway is running and API connections are enabled")]
    ConnectionUnavailable { attempted: Vec<String> },

    #[error("No valid order ID available")]
    NoValidOrderId,

    #[error("request id {0} already has an outstanding request")]
    DuplicateRequestId(i32),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("not connected to IBKR")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] IBApiError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
