//! Error taxonomy surfaced by the bridge client.

use std::time::Duration;

use thiserror::Error;

/// Server error codes that mean the session id can no longer be resumed.
pub const SESSION_INVALID_CODES: &[&str] = &[
    "SESSION_INVALID",
    "SESSION_NOT_FOUND",
    "SESSION_EXPIRED",
    "UNAUTHORIZED",
];

/// Server error code for rate limiting.
pub const RATE_LIMITED_CODE: &str = "RATE_LIMITED";

/// Retry delay used when a rate-limit error omits `retryAfter`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Longest server-requested retry delay the client will honor.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Errors surfaced to callers and event subscribers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),
    #[error("Network unavailable")]
    NetworkUnavailable,
    #[error("Reconnection failed after {attempts} attempts")]
    ReconnectFailed { attempts: u32 },
    #[error("Server error {code}: {message}")]
    ServerError {
        code: String,
        message: String,
        recoverable: bool,
    },
    #[error("Session is no longer valid")]
    SessionInvalid,
    #[error("Rate limited, retrying in {}ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },
    #[error("Not connected")]
    NotConnected,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Bridge client has shut down")]
    ClientClosed,
}

/// How the client reacts to a server `error` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerErrorKind {
    /// The session id is dead; clear it and stop.
    SessionInvalid,
    /// Reissue the handshake after the delay.
    RateLimited(Duration),
    /// Surface to the caller without retrying.
    Other,
}

/// Classify a server error payload.
#[must_use]
pub fn classify_server_error(
    code: &str,
    retryable: Option<bool>,
    retry_after: Option<f64>,
) -> ServerErrorKind {
    if SESSION_INVALID_CODES.contains(&code) {
        return ServerErrorKind::SessionInvalid;
    }
    let retry_delay = retry_after.and_then(retry_after_delay);
    if code == RATE_LIMITED_CODE {
        return ServerErrorKind::RateLimited(retry_delay.unwrap_or(DEFAULT_RETRY_AFTER));
    }
    match (retryable, retry_delay) {
        (Some(true), Some(delay)) => ServerErrorKind::RateLimited(delay),
        _ => ServerErrorKind::Other,
    }
}

/// `None` for negative or non-finite seconds; oversized values saturate at
/// [`MAX_RETRY_AFTER`].
fn retry_after_delay(secs: f64) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    match Duration::try_from_secs_f64(secs) {
        Ok(delay) => Some(delay.min(MAX_RETRY_AFTER)),
        Err(_) if secs.is_finite() => Some(MAX_RETRY_AFTER),
        Err(_) => None,
    }
}

/// Collaborator store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Store error: {0}")]
    Internal(String),
}
