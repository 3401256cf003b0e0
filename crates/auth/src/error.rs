use thiserror::Error;

use pipeops_core::DomainError;

use crate::password::PasswordError;
use crate::store::StoreError;
use crate::token::TokenError;

/// Authentication and authorization outcomes.
///
/// At the guard boundary these resolve to a redirect, never to a panic or an
/// HTTP 500.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Wrong email or password. Deliberately does not say which.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("authentication required")]
    Unauthenticated,

    #[error("access denied: requires role '{required}', held role '{}'", held.as_deref().unwrap_or("none"))]
    AccessDenied { required: String, held: Option<String> },

    /// The token names an identity that no longer exists.
    #[error("session identity no longer exists")]
    StaleIdentity,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Administrative catalog failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("not found")]
    NotFound,

    /// A unique name is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Delete blocked by records that still reference the target.
    #[error("still referenced by {dependents} dependent record(s)")]
    ReferentialConflict { dependents: usize },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DomainError> for CatalogError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => CatalogError::Validation(msg),
        }
    }
}

impl From<PasswordError> for CatalogError {
    fn from(value: PasswordError) -> Self {
        match value {
            PasswordError::TooShort(_) => CatalogError::Validation(value.to_string()),
            PasswordError::Hash(_) => CatalogError::Store(StoreError::Unavailable(value.to_string())),
        }
    }
}
