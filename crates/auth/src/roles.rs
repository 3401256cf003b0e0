use std::borrow::Cow;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use pipeops_core::DomainError;

/// Role name resolved for a user with no catalog role at sign-in.
pub const GUEST_ROLE: &str = "Guest";

/// Role name used when a live identity has no catalog role during refresh or hydration.
pub const DISPATCHER_ROLE: &str = "dispatcher";

/// Role name as stored in the catalog and carried in tokens.
///
/// The original spelling is preserved for display ("DOE"), but equality and
/// hashing are case-insensitive, so `RoleName::new("Admin") == RoleName::new("admin")`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(Cow<'static, str>);

impl RoleName {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Validated constructor for names coming from administrators.
    pub fn parse(name: &str) -> Result<Self, DomainError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("role name must not be empty"));
        }
        if trimmed.len() > 64 {
            return Err(DomainError::validation("role name must be at most 64 characters"));
        }
        Ok(Self(Cow::Owned(trimmed.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used for every comparison and lookup.
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn matches(&self, other: &str) -> bool {
        self.normalized() == other.to_lowercase()
    }
}

impl PartialEq for RoleName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for RoleName {}

impl Hash for RoleName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl core::fmt::Display for RoleName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role claim carried in a session token.
///
/// A claim is either absent (freshly issued for a user whose role was not yet
/// known, or written by an older client) or names a role. An empty string on
/// the wire decodes to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum RoleClaim {
    #[default]
    None,
    Named(RoleName),
}

impl RoleClaim {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        let name: Cow<'static, str> = name.into();
        Self::from(Some(name.into_owned()))
    }

    pub fn as_name(&self) -> Option<&RoleName> {
        match self {
            RoleClaim::None => None,
            RoleClaim::Named(name) => Some(name),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RoleClaim::None)
    }
}

impl From<Option<String>> for RoleClaim {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) if !name.trim().is_empty() => RoleClaim::Named(RoleName::new(name)),
            _ => RoleClaim::None,
        }
    }
}

impl From<RoleClaim> for Option<String> {
    fn from(value: RoleClaim) -> Self {
        match value {
            RoleClaim::None => None,
            RoleClaim::Named(name) => Some(name.as_str().to_string()),
        }
    }
}

impl From<Option<RoleName>> for RoleClaim {
    fn from(value: Option<RoleName>) -> Self {
        match value {
            Some(name) => RoleClaim::Named(name),
            None => RoleClaim::None,
        }
    }
}

/// The closed set of roles a protected surface can require.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredRole {
    Admin,
    Doe,
    Dispatcher,
}

impl RequiredRole {
    pub const ALL: [RequiredRole; 3] = [RequiredRole::Admin, RequiredRole::Doe, RequiredRole::Dispatcher];

    /// Display label, spelled the way the catalog names the role.
    pub fn label(self) -> &'static str {
        match self {
            RequiredRole::Admin => "admin",
            RequiredRole::Doe => "DOE",
            RequiredRole::Dispatcher => "dispatcher",
        }
    }
}

impl core::fmt::Display for RequiredRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

impl core::str::FromStr for RequiredRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(RequiredRole::Admin),
            "doe" => Ok(RequiredRole::Doe),
            "dispatcher" => Ok(RequiredRole::Dispatcher),
            other => Err(DomainError::validation(format!("unknown required role '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn role_names_compare_case_insensitively() {
        assert_eq!(RoleName::new("DOE"), RoleName::new("doe"));
        assert!(RoleName::new("Admin").matches("ADMIN"));

        let mut set = HashSet::new();
        set.insert(RoleName::new("Dispatcher"));
        assert!(set.contains(&RoleName::new("dispatcher")));
        assert_eq!(RoleName::new("DOE").to_string(), "DOE");
    }

    #[test]
    fn parse_trims_and_rejects_blank() {
        assert_eq!(RoleName::parse("  DOE ").unwrap().as_str(), "DOE");
        assert!(RoleName::parse("   ").is_err());
    }

    #[test]
    fn empty_claim_decodes_to_none() {
        let claim: RoleClaim = serde_json::from_str("\"\"").unwrap();
        assert!(claim.is_none());
        let claim: RoleClaim = serde_json::from_str("null").unwrap();
        assert!(claim.is_none());
        let claim: RoleClaim = serde_json::from_str("\"DOE\"").unwrap();
        assert_eq!(claim.as_name().map(RoleName::as_str), Some("DOE"));
        assert_eq!(serde_json::to_string(&RoleClaim::None).unwrap(), "null");
    }

    #[test]
    fn required_role_parses_any_case() {
        assert_eq!("DOE".parse::<RequiredRole>().unwrap(), RequiredRole::Doe);
        assert_eq!("doe".parse::<RequiredRole>().unwrap(), RequiredRole::Doe);
        assert_eq!("Admin".parse::<RequiredRole>().unwrap(), RequiredRole::Admin);
        assert!("manager".parse::<RequiredRole>().is_err());
    }
}
