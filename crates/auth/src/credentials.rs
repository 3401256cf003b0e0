//! Credential verification at sign-in.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use pipeops_core::UserId;

use crate::error::AuthError;
use crate::password::PasswordHasher;
use crate::roles::{RoleName, GUEST_ROLE};
use crate::store::IdentityStore;

/// Identity established by a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedIdentity {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role_name: RoleName,
}

pub struct CredentialVerifier {
    store: Arc<dyn IdentityStore>,
    hasher: PasswordHasher,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn IdentityStore>, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    /// Check `email`/`password` against the stored identity.
    ///
    /// Emails are stored lowercased, so the input is trimmed and lowercased
    /// before the exact lookup. Unknown email and wrong password both yield
    /// `InvalidCredentials`, and both cost one bcrypt verification.
    pub async fn verify(&self, email: &str, password: &str) -> Result<VerifiedIdentity, AuthError> {
        let email = email.trim().to_lowercase();
        let identity = self.store.identity_by_email(&email).await?;

        let stored_hash = identity.as_ref().map(|i| i.user.password_hash.as_str());
        if !self.hasher.verify(password, stored_hash) {
            debug!("credential verification failed");
            return Err(AuthError::InvalidCredentials);
        }

        let Some(identity) = identity else {
            return Err(AuthError::InvalidCredentials);
        };

        let role_name = identity
            .role_name()
            .cloned()
            .unwrap_or_else(|| RoleName::new(GUEST_ROLE));

        info!(user_id = %identity.user.id, role = %role_name, "credentials verified");

        Ok(VerifiedIdentity {
            id: identity.user.id,
            name: identity.user.name,
            email: identity.user.email,
            role_name,
        })
    }
}
