//! The single entry point protected surfaces call.

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::error::AuthError;
use crate::error_page::ErrorPage;
use crate::policy::has_required_role;
use crate::roles::RequiredRole;
use crate::session::{Session, SessionHydrator, TokenService};

/// Where a rejected request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRedirect {
    SignIn,
    Error(ErrorPage),
}

/// Outcome of `require_auth`. Authorization failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow {
        session: Session,
        /// Re-signed credential when the role claim was healed on this pass.
        refreshed_token: Option<String>,
    },
    Redirect(AuthRedirect),
}

impl GuardDecision {
    pub fn session(&self) -> Option<&Session> {
        match self {
            GuardDecision::Allow { session, .. } => Some(session),
            GuardDecision::Redirect(_) => None,
        }
    }
}

/// An authenticated session plus an optional replacement credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    pub session: Session,
    pub refreshed_token: Option<String>,
}

pub struct AuthorizationGuard {
    tokens: TokenService,
    hydrator: SessionHydrator,
}

impl AuthorizationGuard {
    pub fn new(tokens: TokenService, hydrator: SessionHydrator) -> Self {
        Self { tokens, hydrator }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Decode, heal and re-validate a credential.
    ///
    /// - no credential → `Unauthenticated`
    /// - bad signature / expired → `Token`
    /// - identity gone → `StaleIdentity`
    pub async fn authenticate(&self, token: Option<&str>, now: DateTime<Utc>) -> Result<Authorized, AuthError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::Unauthenticated)?;
        let claims = self.tokens.decode(token, now)?;

        let refreshed = self.tokens.refresh(claims).await?;
        let session = self
            .hydrator
            .hydrate(&refreshed.claims)
            .await?
            .ok_or(AuthError::StaleIdentity)?;

        let refreshed_token = if refreshed.changed {
            Some(self.tokens.encode(&refreshed.claims)?)
        } else {
            None
        };

        Ok(Authorized { session, refreshed_token })
    }

    /// Authenticate, then check the role requirement when one is given.
    pub async fn authorize(
        &self,
        token: Option<&str>,
        required: Option<RequiredRole>,
        now: DateTime<Utc>,
    ) -> Result<Authorized, AuthError> {
        let authorized = self.authenticate(token, now).await?;

        if let Some(required) = required {
            let held = authorized.session.role.as_str();
            if !has_required_role(Some(held), required) {
                return Err(AuthError::AccessDenied {
                    required: required.label().to_string(),
                    held: Some(held.to_string()),
                });
            }
        }

        Ok(authorized)
    }

    /// Resolve a request to a navigation decision.
    ///
    /// Stale identities and bad credentials look exactly like "not signed in".
    pub async fn require_auth(&self, token: Option<&str>, required: Option<RequiredRole>) -> GuardDecision {
        match self.authorize(token, required, Utc::now()).await {
            Ok(Authorized { session, refreshed_token }) => GuardDecision::Allow { session, refreshed_token },
            Err(err) => GuardDecision::Redirect(redirect_for(err)),
        }
    }

    /// Hydrated session for display, or `None`; never redirects.
    pub async fn current_session(&self, token: Option<&str>) -> Option<Authorized> {
        self.authenticate(token, Utc::now()).await.ok()
    }
}

fn redirect_for(err: AuthError) -> AuthRedirect {
    match err {
        AuthError::AccessDenied { required, held } => {
            warn!(required = %required, held = ?held, "access denied");
            AuthRedirect::Error(ErrorPage::access_denied(required, held))
        }
        AuthError::Store(e) => {
            error!(error = %e, "identity store failure during session check");
            AuthRedirect::Error(ErrorPage::Configuration)
        }
        AuthError::Token(crate::token::TokenError::Signing(e)) => {
            error!(error = %e, "token signing failed during refresh");
            AuthRedirect::Error(ErrorPage::Configuration)
        }
        other => {
            debug!(reason = %other, "unauthenticated request");
            AuthRedirect::SignIn
        }
    }
}
