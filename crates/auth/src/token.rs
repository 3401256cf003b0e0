//! Signed token encoding (HS256 JWT).

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::claims::{validate_claims, ClaimsValidationError, SessionClaims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("malformed or tampered token")]
    Invalid,

    #[error(transparent)]
    Claims(#[from] ClaimsValidationError),
}

/// Encodes claims into an opaque, tamper-evident credential and back.
pub trait TokenCodec: Send + Sync {
    fn encode(&self, claims: &SessionClaims) -> Result<String, TokenError>;

    /// Verify the signature and the claim time window.
    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError>;
}

/// HMAC-SHA256 signed JWTs.
pub struct Hs256TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Hs256TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

impl TokenCodec for Hs256TokenCodec {
    fn encode(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // The time window is checked by `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|_| TokenError::Invalid)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::RoleClaim;
    use chrono::Duration;
    use pipeops_core::UserId;

    fn claims(now: DateTime<Utc>) -> SessionClaims {
        SessionClaims::new(
            UserId::new(),
            "dispatch@example.com",
            "Dispatch Desk",
            RoleClaim::named("dispatcher"),
            now,
            Duration::minutes(30),
        )
    }

    #[test]
    fn decodes_what_it_encodes() {
        let codec = Hs256TokenCodec::new("test-secret");
        let now = Utc::now();
        let original = claims(now);

        let token = codec.encode(&original).unwrap();
        let decoded = codec.decode(&token, now).unwrap();

        assert_eq!(decoded.email, original.email);
        assert_eq!(decoded.role, original.role);
        assert_eq!(decoded.exp.timestamp(), original.exp.timestamp());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let now = Utc::now();
        let token = Hs256TokenCodec::new("other-secret").encode(&claims(now)).unwrap();
        let err = Hs256TokenCodec::new("test-secret").decode(&token, now).unwrap_err();
        assert_eq!(err, TokenError::Invalid);
    }

    #[test]
    fn edited_payload_is_rejected() {
        let codec = Hs256TokenCodec::new("test-secret");
        let now = Utc::now();
        let token = codec.encode(&claims(now)).unwrap();

        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[1] = parts[1].chars().rev().collect();
        let tampered = parts.join(".");

        assert_eq!(codec.decode(&tampered, now).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn expired_token_is_rejected() {
        let codec = Hs256TokenCodec::new("test-secret");
        let issued = Utc::now() - Duration::hours(2);
        let token = codec.encode(&claims(issued)).unwrap();
        assert_eq!(
            codec.decode(&token, Utc::now()).unwrap_err(),
            TokenError::Claims(ClaimsValidationError::Expired)
        );
    }
}
