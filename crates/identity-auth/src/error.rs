//! Error types for credential storage and identity payloads

/// Errors from durable storage and payload handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage parse error: {0}")]
    StorageParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for identity-auth operations.
pub type Result<T> = std::result::Result<T, Error>;
