//! Error taxonomy for the broker.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Top-level error type for the broker.
///
/// Handlers never propagate a panic across the event-loop boundary (see
/// `spec.md` §7): every fallible operation returns a `BrokerError`, which is
/// logged at the component that owns it and turned into an HTTP response at
/// the dispatcher boundary.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Filesystem or I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be resolved.
    #[error("configuration error: {0}")]
    Config(String),

    /// Client request was malformed (missing `name`, bad payload, ...).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Referenced page or job does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The configured port is already bound.
    #[error("port {0} already in use")]
    PortInUse(u16),
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Io(_) | Self::Config(_) | Self::PortInUse(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// Convenience alias used throughout the crate.
pub type BrokerResult<T> = Result<T, BrokerError>;
