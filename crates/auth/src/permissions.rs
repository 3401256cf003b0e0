use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use pipeops_core::DomainError;

/// Permission identifier in `resource.action` form (e.g. "shipments.manage").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Build a permission from a name known to be well-formed.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Validate and normalize an administrator-supplied permission name.
    ///
    /// Names are lowercased and must have at least two dot-separated segments
    /// made of `[a-z0-9_-]`.
    pub fn parse(name: &str) -> Result<Self, DomainError> {
        let normalized = name.trim().to_lowercase();
        let segments: Vec<&str> = normalized.split('.').collect();
        if segments.len() < 2 {
            return Err(DomainError::validation(format!(
                "permission '{normalized}' must be dotted (resource.action)"
            )));
        }
        let well_formed = segments.iter().all(|s| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        });
        if !well_formed {
            return Err(DomainError::validation(format!(
                "permission '{normalized}' contains an empty or invalid segment"
            )));
        }
        Ok(Self(Cow::Owned(normalized)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resource(&self) -> &str {
        self.as_str().split('.').next().unwrap_or_default()
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const VIEW_DASHBOARD: Permission = Permission::from_static("dashboard.view");
pub const MANAGE_USERS: Permission = Permission::from_static("users.manage");
pub const EDIT_SETTINGS: Permission = Permission::from_static("settings.edit");
pub const VIEW_REPORTS: Permission = Permission::from_static("reports.view");
pub const MANAGE_SHIPMENTS: Permission = Permission::from_static("shipments.manage");
pub const MANAGE_TANKS: Permission = Permission::from_static("tanks.manage");
pub const DISPATCH: Permission = Permission::from_static("dispatch.execute");

/// Every permission the built-in role policies reference, with a description.
pub fn catalog_permissions() -> [(Permission, &'static str); 7] {
    [
        (VIEW_DASHBOARD, "View the operations dashboard"),
        (MANAGE_USERS, "Create, update and delete user accounts"),
        (EDIT_SETTINGS, "Edit platform settings"),
        (VIEW_REPORTS, "View and export reports"),
        (MANAGE_SHIPMENTS, "Create and update shipments"),
        (MANAGE_TANKS, "Record tank gauging and manage tanks"),
        (DISPATCH, "Dispatch shipments to the pipeline"),
    ]
}

/// Capability flags a user interface uses to show or hide features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_view_dashboard: bool,
    pub can_manage_users: bool,
    pub can_edit_settings: bool,
    pub can_view_reports: bool,
    pub can_manage_shipments: bool,
    pub can_manage_tanks: bool,
    pub can_dispatch: bool,
}

impl Capabilities {
    /// All flags false.
    pub const NONE: Capabilities = Capabilities {
        can_view_dashboard: false,
        can_manage_users: false,
        can_edit_settings: false,
        can_view_reports: false,
        can_manage_shipments: false,
        can_manage_tanks: false,
        can_dispatch: false,
    };

    /// Derive flags from a permission set.
    pub fn from_permissions<'a, I>(permissions: I) -> Self
    where
        I: IntoIterator<Item = &'a Permission>,
    {
        let mut caps = Capabilities::NONE;
        for permission in permissions {
            match permission.as_str() {
                "dashboard.view" => caps.can_view_dashboard = true,
                "users.manage" => caps.can_manage_users = true,
                "settings.edit" => caps.can_edit_settings = true,
                "reports.view" => caps.can_view_reports = true,
                "shipments.manage" => caps.can_manage_shipments = true,
                "tanks.manage" => caps.can_manage_tanks = true,
                "dispatch.execute" => caps.can_dispatch = true,
                _ => {}
            }
        }
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case() {
        let p = Permission::parse(" Shipments.Manage ").unwrap();
        assert_eq!(p.as_str(), "shipments.manage");
        assert_eq!(p.resource(), "shipments");
    }

    #[test]
    fn parse_rejects_undotted_and_empty_segments() {
        assert!(Permission::parse("shipments").is_err());
        assert!(Permission::parse("shipments.").is_err());
        assert!(Permission::parse("tank gauging.view").is_err());
    }

    #[test]
    fn capabilities_follow_permissions() {
        let caps = Capabilities::from_permissions([&VIEW_REPORTS, &DISPATCH]);
        assert!(caps.can_view_reports);
        assert!(caps.can_dispatch);
        assert!(!caps.can_manage_users);
        assert_eq!(Capabilities::from_permissions([]), Capabilities::NONE);
    }
}
