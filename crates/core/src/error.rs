use thiserror::Error;

/// Rejection of a malformed value before it reaches any store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Names, emails and other free-form input that fail their format rules.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier string that is not a UUID. Carries the id type name.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
