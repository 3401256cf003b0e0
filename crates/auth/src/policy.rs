//! The authoritative role policy table.
//!
//! Both the hierarchy decision (`has_required_role`) and the capability flags
//! (`capabilities_for`) are read from `ROLE_POLICIES`, so a tier's rank and its
//! permission set are declared in exactly one place.
//!
//! The hierarchy is deliberately not linear: `admin` satisfies every
//! requirement, while `doe` and `dispatcher` are siblings that satisfy only
//! themselves.

use serde::Serialize;

use crate::permissions::{
    Capabilities, Permission, DISPATCH, EDIT_SETTINGS, MANAGE_SHIPMENTS, MANAGE_TANKS,
    MANAGE_USERS, VIEW_DASHBOARD, VIEW_REPORTS,
};
use crate::roles::RequiredRole;

/// A role tier known to the policy table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleTier {
    Admin,
    Doe,
    Dispatcher,
}

impl RoleTier {
    /// Resolve a role name to a tier.
    ///
    /// Letter case is ignored; anything else, surrounding whitespace included,
    /// makes the name unknown.
    pub fn from_name(name: &str) -> Option<RoleTier> {
        match name.to_lowercase().as_str() {
            "admin" => Some(RoleTier::Admin),
            "doe" => Some(RoleTier::Doe),
            "dispatcher" => Some(RoleTier::Dispatcher),
            _ => None,
        }
    }

    pub fn policy(self) -> &'static RolePolicy {
        match self {
            RoleTier::Admin => &ROLE_POLICIES[0],
            RoleTier::Doe => &ROLE_POLICIES[1],
            RoleTier::Dispatcher => &ROLE_POLICIES[2],
        }
    }

    /// Whether holding this tier satisfies `required`.
    ///
    /// A tier satisfies its own requirement, and any requirement whose tier
    /// has a strictly lower rank. Tiers of equal rank never satisfy each other.
    pub fn satisfies(self, required: RequiredRole) -> bool {
        let required = RoleTier::from(required);
        self == required || self.policy().rank > required.policy().rank
    }
}

impl From<RequiredRole> for RoleTier {
    fn from(value: RequiredRole) -> Self {
        match value {
            RequiredRole::Admin => RoleTier::Admin,
            RequiredRole::Doe => RoleTier::Doe,
            RequiredRole::Dispatcher => RoleTier::Dispatcher,
        }
    }
}

/// Rank and permission set of one tier.
#[derive(Debug)]
pub struct RolePolicy {
    pub tier: RoleTier,
    pub name: &'static str,
    pub description: &'static str,
    pub rank: u8,
    pub permissions: &'static [Permission],
}

impl RolePolicy {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::from_permissions(self.permissions)
    }
}

pub static ROLE_POLICIES: [RolePolicy; 3] = [
    RolePolicy {
        tier: RoleTier::Admin,
        name: "admin",
        description: "Platform administrator with every capability",
        rank: 2,
        permissions: &[
            VIEW_DASHBOARD,
            MANAGE_USERS,
            EDIT_SETTINGS,
            VIEW_REPORTS,
            MANAGE_SHIPMENTS,
            MANAGE_TANKS,
            DISPATCH,
        ],
    },
    RolePolicy {
        tier: RoleTier::Doe,
        name: "DOE",
        description: "Regulatory reporting access",
        rank: 1,
        permissions: &[VIEW_DASHBOARD, VIEW_REPORTS],
    },
    RolePolicy {
        tier: RoleTier::Dispatcher,
        name: "dispatcher",
        description: "Shipment dispatch and tank operations",
        rank: 1,
        permissions: &[VIEW_DASHBOARD, MANAGE_SHIPMENTS, MANAGE_TANKS, DISPATCH],
    },
];

/// Whether `held` satisfies `required`.
///
/// Fails closed: a missing or unknown held role never satisfies anything.
pub fn has_required_role(held: Option<&str>, required: RequiredRole) -> bool {
    held.and_then(RoleTier::from_name)
        .is_some_and(|tier| tier.satisfies(required))
}

/// Capability flags for a role name; unknown names get all-false flags.
pub fn capabilities_for(role: &str) -> Capabilities {
    RoleTier::from_name(role)
        .map(|tier| tier.policy().capabilities())
        .unwrap_or(Capabilities::NONE)
}

/// Role definition with its granted permissions (for display).
#[derive(Debug, Clone, Serialize)]
pub struct RoleDefinition {
    pub name: String,
    pub tier: RoleTier,
    pub rank: u8,
    pub description: String,
    pub permissions: Vec<String>,
    pub capabilities: Capabilities,
}

/// Every built-in policy in table order.
pub fn role_definitions() -> Vec<RoleDefinition> {
    ROLE_POLICIES
        .iter()
        .map(|p| RoleDefinition {
            name: p.name.to_string(),
            tier: p.tier,
            rank: p.rank,
            description: p.description.to_string(),
            permissions: p.permissions.iter().map(|perm| perm.as_str().to_string()).collect(),
            capabilities: p.capabilities(),
        })
        .collect()
}
