use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pipeops_core::UserId;

use crate::roles::RoleClaim;

/// Session token claims.
///
/// Timestamps are serialized as unix seconds so the payload stays a standard
/// JWT (`iat`/`exp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the user id at issue time.
    pub sub: UserId,

    /// Identity key used for every liveness lookup.
    pub email: String,

    pub name: String,

    /// Cached role name; may be absent until healed.
    #[serde(default)]
    pub role: RoleClaim,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
}

impl SessionClaims {
    pub fn new(
        sub: UserId,
        email: impl Into<String>,
        name: impl Into<String>,
        role: RoleClaim,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            sub,
            email: email.into(),
            name: name.into(),
            role,
            iat: issued_at,
            exp: issued_at + ttl,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Allowed clock skew between issuer and validator.
const CLOCK_SKEW_SECONDS: i64 = 30;

/// Deterministically validate the claim time window.
///
/// Signature verification is done by the token codec before this runs.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), ClaimsValidationError> {
    if claims.exp <= claims.iat {
        return Err(ClaimsValidationError::InvalidTimeWindow);
    }
    if now + Duration::seconds(CLOCK_SKEW_SECONDS) < claims.iat {
        return Err(ClaimsValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(ClaimsValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_at(now: DateTime<Utc>) -> SessionClaims {
        SessionClaims::new(
            UserId::new(),
            "ops@example.com",
            "Ops",
            RoleClaim::None,
            now,
            Duration::minutes(10),
        )
    }

    #[test]
    fn fresh_claims_are_valid() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims_at(now), now), Ok(()));
    }

    #[test]
    fn expired_claims_are_rejected() {
        let now = Utc::now();
        let claims = claims_at(now - Duration::minutes(11));
        assert_eq!(validate_claims(&claims, now), Err(ClaimsValidationError::Expired));
    }

    #[test]
    fn future_claims_are_rejected() {
        let now = Utc::now();
        let claims = claims_at(now + Duration::minutes(5));
        assert_eq!(validate_claims(&claims, now), Err(ClaimsValidationError::NotYetValid));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = Utc::now();
        let mut claims = claims_at(now);
        claims.exp = claims.iat;
        assert_eq!(validate_claims(&claims, now), Err(ClaimsValidationError::InvalidTimeWindow));
    }

    #[test]
    fn missing_role_field_deserializes_as_none() {
        let json = serde_json::json!({
            "sub": UserId::new(),
            "email": "a@example.com",
            "name": "A",
            "iat": 1_700_000_000,
            "exp": 1_700_000_600,
        });
        let claims: SessionClaims = serde_json::from_value(json).unwrap();
        assert!(claims.role.is_none());
    }
}
