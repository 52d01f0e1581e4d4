//! Typed errors carried from the auth and handler stages to the response writer.
//!
//! # Design Decisions
//! - A `GateError` is data, not a crash: every stage returns it explicitly
//!   and the dispatcher inspects it exactly once when building the response
//! - Only `Status` and `NotReplayable` surface their message to the client;
//!   everything else becomes a generic 500 with the detail kept in the logs
//! - Transport faults are never written back, the peer is already gone

use axum::http::{header::InvalidHeaderValue, Method, StatusCode};
use thiserror::Error;

use crate::http::response::TransportError;

/// Error raised by any stage of request processing.
#[derive(Debug, Error)]
pub enum GateError {
    /// Intentional, status-carrying signal (missing file, origin mismatch, CSRF mismatch).
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    /// A request that needs the CAS login round trip but cannot be replayed afterwards.
    #[error("cannot replay a {method} request through the CAS login redirect")]
    NotReplayable { method: Method },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),

    /// The response could not be delivered.
    #[error("response transport: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Internal(String),
}

impl GateError {
    /// Create a typed error with an explicit status code.
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        GateError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        GateError::Internal(message.into())
    }

    /// Status code written to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::Status { status, .. } => *status,
            GateError::NotReplayable { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client. Internal detail is never leaked.
    pub fn public_message(&self) -> String {
        match self {
            GateError::Status { message, .. } => message.clone(),
            GateError::NotReplayable { .. } => {
                "Session required: reload the page to sign in again".to_string()
            }
            _ => "Internal Server Error".to_string(),
        }
    }

    /// True for faults that must be logged with detail and hidden from the client.
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            GateError::Io(_) | GateError::Header(_) | GateError::Internal(_)
        )
    }
}
