//! Error types for session operations

use std::time::Duration;

use identity_auth::{UNEXPECTED_ERROR_MESSAGE, flatten_problem};

/// Errors from requests issued through the session pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// HTTP status of the response, if the failure produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 401: the access credential was missing, expired or revoked.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Human-readable messages for the result envelope.
    ///
    /// Errors that carry a response body are flattened from the server's
    /// problem document. Failures without a response map to a generic
    /// message so transport details never reach the UI.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Error::Status { body, .. } => flatten_problem(body),
            _ => vec![UNEXPECTED_ERROR_MESSAGE.to_string()],
        }
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
