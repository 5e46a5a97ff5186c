use thiserror::Error;

/// Result type for secretcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the secretcache library
#[derive(Error, Debug)]
pub enum Error {
    /// The master secret is not available; the caller must prompt for an
    /// unlock before retrying
    #[error("master secret not available")]
    NotAvailable,

    /// The secret instance has already been destroyed
    #[error("secret is already closed")]
    SecretClosed,

    /// Errors related to expiration alarm registration
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// A caller presented a token that does not grant access to lock events
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Errors reported by a notification/status collaborator
    #[error("notification error: {0}")]
    Notification(String),

    /// Failed to generate secure random data
    #[error("random generation failed: {0}")]
    RandomGenerationFailed(String),

    /// General internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Error::Internal(err.to_string())
    }
}
