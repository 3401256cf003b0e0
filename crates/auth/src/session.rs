//! Token lifecycle (issue, lazy role healing) and per-request session hydration.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use pipeops_core::UserId;

use crate::claims::SessionClaims;
use crate::credentials::VerifiedIdentity;
use crate::error::AuthError;
use crate::permissions::Capabilities;
use crate::policy::capabilities_for;
use crate::roles::{RoleClaim, RoleName, DISPATCHER_ROLE, GUEST_ROLE};
use crate::store::{IdentityStore, StoreError};
use crate::token::TokenCodec;

/// A hydrated session: the only identity value protected code ever sees.
///
/// `role` is always resolved; no downstream code handles an absent role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub role: RoleName,
}

impl Session {
    pub fn capabilities(&self) -> Capabilities {
        capabilities_for(self.role.as_str())
    }
}

/// A freshly signed credential and the claims inside it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: SessionClaims,
}

/// Result of a per-use refresh pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refreshed {
    pub claims: SessionClaims,
    /// True when the role claim was healed and the credential should be re-signed.
    pub changed: bool,
}

/// Builds signed claims at sign-in and heals missing role claims on use.
pub struct TokenService {
    codec: Arc<dyn TokenCodec>,
    store: Arc<dyn IdentityStore>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(codec: Arc<dyn TokenCodec>, store: Arc<dyn IdentityStore>, ttl: Duration) -> Self {
        Self { codec, store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, identity: &VerifiedIdentity, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let claims = SessionClaims::new(
            identity.id,
            identity.email.clone(),
            identity.name.clone(),
            RoleClaim::Named(identity.role_name.clone()),
            now,
            self.ttl,
        );
        let token = self.codec.encode(&claims)?;
        Ok(IssuedToken { token, claims })
    }

    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, AuthError> {
        Ok(self.codec.decode(token, now)?)
    }

    /// Re-sign claims without touching their time window.
    pub fn encode(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        Ok(self.codec.encode(claims)?)
    }

    /// Heal an absent role claim from the store.
    ///
    /// A named claim is trusted as-is. An absent claim takes the user's
    /// current role name, or `dispatcher` when the user has none; if the user
    /// no longer exists the claim stays absent (liveness is decided by the
    /// hydrator, not here).
    pub async fn refresh(&self, mut claims: SessionClaims) -> Result<Refreshed, StoreError> {
        if !claims.role.is_none() {
            return Ok(Refreshed { claims, changed: false });
        }

        let identity = self
            .store
            .identity_by_email(&claims.email)
            .await?
            .filter(|identity| identity.user.id == claims.sub);
        let Some(identity) = identity else {
            debug!("role claim left empty: identity not found");
            return Ok(Refreshed { claims, changed: false });
        };

        let healed = identity
            .role_name()
            .cloned()
            .unwrap_or_else(|| RoleName::new(DISPATCHER_ROLE));
        debug!(user_id = %identity.user.id, role = %healed, "role claim healed");
        claims.role = RoleClaim::Named(healed);

        Ok(Refreshed { claims, changed: true })
    }
}

/// Re-validates the identity behind a token against the live store.
///
/// Runs on every protected access; nothing is cached between calls.
pub struct SessionHydrator {
    store: Arc<dyn IdentityStore>,
}

impl SessionHydrator {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// `Ok(None)` when the identity behind the token is gone: the caller
    /// treats the request as never authenticated.
    ///
    /// The identity is gone when the email no longer resolves, when it
    /// resolves to a different account than `sub`, or when the account's role
    /// was unset while the token still names one. A `Guest` claim carries no
    /// grants and survives a missing role.
    pub async fn hydrate(&self, claims: &SessionClaims) -> Result<Option<Session>, StoreError> {
        let Some(identity) = self.store.identity_by_email(&claims.email).await? else {
            warn!(sub = %claims.sub, "token references a missing identity; session cleared");
            return Ok(None);
        };

        if identity.user.id != claims.sub {
            warn!(
                sub = %claims.sub,
                user_id = %identity.user.id,
                "token email now belongs to another account; session cleared"
            );
            return Ok(None);
        }

        let role = match (claims.role.as_name(), identity.role_name()) {
            (Some(claimed), Some(_)) => claimed.clone(),
            (None, Some(live)) => live.clone(),
            (Some(claimed), None) if claimed.matches(GUEST_ROLE) => claimed.clone(),
            (claimed, None) => {
                warn!(
                    sub = %claims.sub,
                    claimed = ?claimed.map(RoleName::as_str),
                    "token outlived its role assignment; session cleared"
                );
                return Ok(None);
            }
        };

        Ok(Some(Session {
            user_id: identity.user.id,
            name: identity.user.name,
            email: identity.user.email,
            role,
        }))
    }
}
