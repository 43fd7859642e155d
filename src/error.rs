//! Error types for tandem-rpc.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::{codes, WireError};

/// Main error type for all engine operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// A method with this name is already registered.
    #[error("method `{0}` is already registered")]
    DuplicateMethod(String),

    /// The name is reserved for the connection handshake.
    #[error("method name `{0}` is reserved")]
    ReservedMethod(String),

    /// No handshake or response arrived within the deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The peer answered with a structured error.
    #[error(transparent)]
    Remote(#[from] WireError),

    /// The engine was destroyed while the operation was in flight.
    #[error("engine destroyed")]
    Closed,

    /// JSON (de)serialization error at the typed call boundary.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    /// Wire error code carried by this error, if it has one.
    ///
    /// Timeouts map to the reserved connection-timeout code even though
    /// they are raised locally and never cross the wire.
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Remote(error) => Some(error.code),
            RpcError::Timeout(_) => Some(codes::CONNECT_TIMEOUT),
            _ => None,
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
