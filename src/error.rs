//! Errors returned to clients.
//!
//! A handler failure travels back to the client as an error-flagged
//! response whose body is the serialized [`HandlerError`]:
//! `{"code": ..., "message": ...}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code given to errors that carry no code of their own.
pub const CODE_UNKNOWN: &str = "unknown";
/// Code for a request body the handler could not decode.
pub const CODE_BAD_REQUEST: &str = "BadRequest";
/// Code for a malformed route string.
pub const CODE_BAD_ROUTE: &str = "BadRoute";
/// Code for a route with no registered handler.
pub const CODE_NOT_FOUND: &str = "NotFound";
/// Code for a handler that panicked.
pub const CODE_INTERNAL: &str = "InternalError";
/// Code for a request dropped by the rate limiter.
pub const CODE_RATE_LIMIT: &str = "RateLimit";

/// Error produced by a handler, sent to the client in an error response.
///
/// # Examples
///
/// ```
/// use playwire::error::HandlerError;
///
/// let err = HandlerError::new("RoomFull", "room 7 is full");
/// assert_eq!(err.to_string(), "RoomFull: room 7 is full");
///
/// let plain = HandlerError::plain("disk on fire");
/// assert_eq!(plain.code, "unknown");
/// ```
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct HandlerError {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl HandlerError {
    /// Create an error with an explicit code.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wrap an error that has no code; the code becomes `"unknown"`.
    #[must_use]
    pub fn plain(error: impl fmt::Display) -> Self { Self::new(CODE_UNKNOWN, error.to_string()) }

    /// The request body could not be decoded.
    #[must_use]
    pub fn bad_request(error: impl fmt::Display) -> Self { Self::new(CODE_BAD_REQUEST, error.to_string()) }

    /// The route string was malformed.
    #[must_use]
    pub fn bad_route(error: impl fmt::Display) -> Self { Self::new(CODE_BAD_ROUTE, error.to_string()) }

    /// No handler is registered for `route`.
    #[must_use]
    pub fn route_not_found(route: impl fmt::Display) -> Self {
        Self::new(CODE_NOT_FOUND, format!("no handler for route {route}"))
    }

    /// The handler panicked.
    #[must_use]
    pub fn panicked() -> Self { Self::new(CODE_INTERNAL, "handler panicked") }

    /// The request exceeded the session's rate limit.
    #[must_use]
    pub fn rate_limited() -> Self { Self::new(CODE_RATE_LIMIT, "rate limit exceeded") }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::HandlerError;

    #[rstest]
    #[case(HandlerError::plain("boom"), "unknown")]
    #[case(HandlerError::rate_limited(), "RateLimit")]
    #[case(HandlerError::panicked(), "InternalError")]
    #[case(HandlerError::route_not_found("room.enter"), "NotFound")]
    fn codes(#[case] error: HandlerError, #[case] code: &str) {
        assert_eq!(error.code, code);
    }

    #[test]
    fn serializes_as_code_and_message() {
        let value = serde_json::to_value(HandlerError::new("E1", "bad")).expect("serialize");
        assert_eq!(value, json!({"code": "E1", "message": "bad"}));
    }
}
