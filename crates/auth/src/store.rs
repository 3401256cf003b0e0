//! Storage boundary for identity and catalog records.
//!
//! Implementations live in `pipeops-infra`; services in this crate only see
//! these traits.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use pipeops_core::{PermissionId, RoleId, RoleTypeId, UserId};

use crate::error::CatalogError;
use crate::permissions::Permission;
use crate::roles::RoleName;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("identity store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt identity record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: Option<RoleId>,
    /// Free-form role category kept from older account data; never used for authorization.
    pub legacy_role: Option<String>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTypeRecord {
    pub id: RoleTypeId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: RoleName,
    pub description: Option<String>,
    pub is_system: bool,
    pub role_type_id: RoleTypeId,
    pub permission_ids: BTreeSet<PermissionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub name: Permission,
    pub description: Option<String>,
}

/// A user joined with its catalog role, as read in one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: UserRecord,
    pub role: Option<RoleRecord>,
}

impl Identity {
    pub fn role_name(&self) -> Option<&RoleName> {
        self.role.as_ref().map(|r| &r.name)
    }
}

/// Read side used on every sign-in and every protected request.
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up a user by exact email, joined with its role.
    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;
}

/// Administrative catalog maintenance.
///
/// Name uniqueness (case-insensitive) and the role-type referential guard are
/// enforced by the implementation atomically with the write.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_role_types(&self) -> Result<Vec<RoleTypeRecord>, StoreError>;
    async fn role_type(&self, id: RoleTypeId) -> Result<Option<RoleTypeRecord>, StoreError>;
    async fn insert_role_type(&self, record: RoleTypeRecord) -> Result<(), CatalogError>;
    async fn update_role_type(&self, record: RoleTypeRecord) -> Result<(), CatalogError>;
    /// Fails with `ReferentialConflict` and deletes nothing while any role references the type.
    async fn delete_role_type(&self, id: RoleTypeId) -> Result<(), CatalogError>;
    async fn count_roles_of_type(&self, id: RoleTypeId) -> Result<usize, StoreError>;

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, StoreError>;
    async fn role(&self, id: RoleId) -> Result<Option<RoleRecord>, StoreError>;
    async fn insert_role(&self, record: RoleRecord) -> Result<(), CatalogError>;
    async fn update_role(&self, record: RoleRecord) -> Result<(), CatalogError>;
    /// Deletes the role and unsets it on every user holding it.
    async fn delete_role(&self, id: RoleId) -> Result<(), CatalogError>;
    async fn set_role_permissions(
        &self,
        id: RoleId,
        permissions: BTreeSet<PermissionId>,
    ) -> Result<(), CatalogError>;

    async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, StoreError>;
    async fn insert_permission(&self, record: PermissionRecord) -> Result<(), CatalogError>;
    /// Deletes the permission and removes it from every role.
    async fn delete_permission(&self, id: PermissionId) -> Result<(), CatalogError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError>;
    async fn user(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;
    async fn insert_user(&self, record: UserRecord) -> Result<(), CatalogError>;
    async fn set_user_role(&self, id: UserId, role_id: Option<RoleId>) -> Result<(), CatalogError>;
    async fn delete_user(&self, id: UserId) -> Result<(), CatalogError>;
}
