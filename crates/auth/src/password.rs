//! Salted password hashing (bcrypt).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password must be at least {0} characters")]
    TooShort(usize),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

pub const MIN_PASSWORD_LEN: usize = 8;

/// Hashes and verifies passwords with a configurable bcrypt cost.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    // Verified against when the account does not exist, so both failure paths
    // spend one bcrypt verification.
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, PasswordError> {
        let dummy_hash = bcrypt::hash("pipeops-no-such-account", cost)?;
        Ok(Self { cost, dummy_hash })
    }

    /// Minimum bcrypt cost, for tests.
    pub fn fast() -> Result<Self, PasswordError> {
        Self::new(4)
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(PasswordError::TooShort(MIN_PASSWORD_LEN));
        }
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// Verify `password` against `stored`, or against the dummy hash when there is none.
    ///
    /// Malformed stored hashes verify as `false`.
    pub fn verify(&self, password: &str, stored: Option<&str>) -> bool {
        match stored {
            Some(hash) => bcrypt::verify(password, hash).unwrap_or(false),
            None => {
                let _ = bcrypt::verify(password, &self.dummy_hash);
                false
            }
        }
    }
}
