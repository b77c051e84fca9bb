//! Failure classification for session requests
//!
//! Decides how a failed call is handled:
//! - `Unauthorized` (401/403): at most one refresh attempt, never a blanket retry
//! - `Transient` (network errors, timeouts, 5xx, anything else): retried with a
//!   fixed delay by callers that retry
//! - `Malformed` (2xx with an unusable body, or a request that cannot be
//!   built such as an invalid bearer header): failure, not retried

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Credentials rejected; refreshing is the only remedy
    Unauthorized,
    /// May succeed if repeated
    Transient,
    /// Repeating the same call cannot change the result
    Malformed,
}

/// Classify an HTTP status code from an error response.
pub fn classify_status(status: u16) -> ErrorClassification {
    match status {
        401 | 403 => ErrorClassification::Unauthorized,
        408 | 429 | 500 | 502 | 503 | 504 => ErrorClassification::Transient,
        _ => ErrorClassification::Transient,
    }
}

/// Classify a pipeline error.
pub fn classify_error(error: &Error) -> ErrorClassification {
    match error {
        Error::Status { status, .. } => classify_status(*status),
        Error::Decode(_) | Error::InvalidRequest(_) => ErrorClassification::Malformed,
        Error::Http(_) | Error::Timeout(_) => ErrorClassification::Transient,
    }
}
