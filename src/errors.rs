//! Client error types.
//!
//! All errors implement `std::error::Error` via `thiserror` and carry the
//! context needed for a log entry.
//!
//! Malformed SSE frames have no variant: the chunk decoder logs and skips them.

use thiserror::Error;

/// Errors that can occur while talking to the inference server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-2xx status before any data was produced.
    #[error("{provider} request failed with HTTP {status}: {body}")]
    TransportRejected {
        provider: String,
        status: u16,
        body: String,
    },

    /// The connection failed or timed out after streaming began.
    #[error("stream interrupted: {reason}")]
    TransportInterrupted {
        reason: String,
    },

    /// The caller's cancellation token fired.
    #[error("stream cancelled")]
    Cancelled,

    /// TCP/HTTP connection to the server failed before a response arrived.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// The server did not respond within the configured timeout.
    #[error("request timeout after {duration_secs}s")]
    Timeout {
        duration_secs: u64,
    },

    /// The request was rejected locally before being sent.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        reason: String,
    },

    /// A non-streaming response body could not be read or decoded.
    #[error("response parse error: {reason}")]
    ResponseParse {
        reason: String,
    },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl ClientError {
    /// HTTP status of a rejected request.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::TransportRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Extract the raw response body, if this is a `TransportRejected`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            ClientError::TransportRejected { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Whether the caller stopped the stream (as opposed to it breaking).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    /// Whether a calling layer could reasonably retry the request.
    ///
    /// The client itself never retries. HTTP 5xx, connection failures, timeouts
    /// and mid-stream interruptions are transient on a local server that is
    /// still loading a model; 4xx and local errors are not.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectionFailed { .. }
                | ClientError::Timeout { .. }
                | ClientError::TransportInterrupted { .. }
                | ClientError::TransportRejected { status: 500..=599, .. }
        )
    }
}
