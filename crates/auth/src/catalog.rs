//! Administrative maintenance of role types, roles, permissions and users.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use pipeops_core::{DomainError, PermissionId, RoleId, RoleTypeId, UserId};

use crate::error::CatalogError;
use crate::password::PasswordHasher;
use crate::permissions::{catalog_permissions, Permission};
use crate::policy::ROLE_POLICIES;
use crate::roles::RoleName;
use crate::store::{CatalogStore, PermissionRecord, RoleRecord, RoleTypeRecord, UserRecord};

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub role_type_id: RoleTypeId,
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub role_type_id: Option<RoleTypeId>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: Option<RoleId>,
    pub legacy_role: Option<String>,
    pub department: Option<String>,
}

pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    hasher: PasswordHasher,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Role types
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_role_types(&self) -> Result<Vec<RoleTypeRecord>, CatalogError> {
        Ok(self.store.list_role_types().await?)
    }

    pub async fn role_type(&self, id: RoleTypeId) -> Result<RoleTypeRecord, CatalogError> {
        self.store.role_type(id).await?.ok_or(CatalogError::NotFound)
    }

    pub async fn create_role_type(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<RoleTypeRecord, CatalogError> {
        let record = RoleTypeRecord {
            id: RoleTypeId::new(),
            name: non_empty(name, "role type name")?,
            description: description.filter(|d| !d.trim().is_empty()),
            created_at: Utc::now(),
        };
        self.store.insert_role_type(record.clone()).await?;
        info!(role_type_id = %record.id, name = %record.name, "role type created");
        Ok(record)
    }

    pub async fn update_role_type(
        &self,
        id: RoleTypeId,
        name: Option<&str>,
        description: Option<String>,
    ) -> Result<RoleTypeRecord, CatalogError> {
        let mut record = self.role_type(id).await?;
        if let Some(name) = name {
            record.name = non_empty(name, "role type name")?;
        }
        if description.is_some() {
            record.description = description.filter(|d| !d.trim().is_empty());
        }
        self.store.update_role_type(record.clone()).await?;
        info!(role_type_id = %id, "role type updated");
        Ok(record)
    }

    /// Rejected with `ReferentialConflict` while any role belongs to the type.
    pub async fn delete_role_type(&self, id: RoleTypeId) -> Result<(), CatalogError> {
        match self.store.delete_role_type(id).await {
            Ok(()) => {
                info!(role_type_id = %id, "role type deleted");
                Ok(())
            }
            Err(CatalogError::ReferentialConflict { dependents }) => {
                warn!(role_type_id = %id, dependents, "role type delete blocked by dependent roles");
                Err(CatalogError::ReferentialConflict { dependents })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn count_roles_of_type(&self, id: RoleTypeId) -> Result<usize, CatalogError> {
        Ok(self.store.count_roles_of_type(id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_roles(&self) -> Result<Vec<RoleRecord>, CatalogError> {
        Ok(self.store.list_roles().await?)
    }

    pub async fn role(&self, id: RoleId) -> Result<RoleRecord, CatalogError> {
        self.store.role(id).await?.ok_or(CatalogError::NotFound)
    }

    pub async fn create_role(&self, new: NewRole) -> Result<RoleRecord, CatalogError> {
        let name = RoleName::parse(&new.name)?;
        self.ensure_role_type_exists(new.role_type_id).await?;
        let permission_ids = self.known_permissions(new.permission_ids).await?;

        let record = RoleRecord {
            id: RoleId::new(),
            name,
            description: new.description.filter(|d| !d.trim().is_empty()),
            is_system: new.is_system,
            role_type_id: new.role_type_id,
            permission_ids,
        };
        self.store.insert_role(record.clone()).await?;
        info!(role_id = %record.id, name = %record.name, "role created");
        Ok(record)
    }

    pub async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<RoleRecord, CatalogError> {
        let mut record = self.role(id).await?;
        if let Some(name) = update.name {
            record.name = RoleName::parse(&name)?;
        }
        if update.description.is_some() {
            record.description = update.description.filter(|d| !d.trim().is_empty());
        }
        if let Some(role_type_id) = update.role_type_id {
            self.ensure_role_type_exists(role_type_id).await?;
            record.role_type_id = role_type_id;
        }
        self.store.update_role(record.clone()).await?;
        info!(role_id = %id, "role updated");
        Ok(record)
    }

    /// Replace a role's permission set. Duplicates collapse; unknown ids are rejected.
    pub async fn set_role_permissions(
        &self,
        id: RoleId,
        permission_ids: Vec<PermissionId>,
    ) -> Result<RoleRecord, CatalogError> {
        let mut record = self.role(id).await?;
        let permission_ids = self.known_permissions(permission_ids).await?;
        self.store.set_role_permissions(id, permission_ids.clone()).await?;
        info!(role_id = %id, count = permission_ids.len(), "role permissions replaced");
        record.permission_ids = permission_ids;
        Ok(record)
    }

    /// System roles cannot be deleted. Users holding the role lose it.
    pub async fn delete_role(&self, id: RoleId) -> Result<(), CatalogError> {
        let record = self.role(id).await?;
        if record.is_system {
            return Err(CatalogError::Conflict(format!(
                "role '{}' is a system role and cannot be deleted",
                record.name
            )));
        }
        self.store.delete_role(id).await?;
        info!(role_id = %id, name = %record.name, "role deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, CatalogError> {
        Ok(self.store.list_permissions().await?)
    }

    pub async fn create_permission(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<PermissionRecord, CatalogError> {
        let record = PermissionRecord {
            id: PermissionId::new(),
            name: Permission::parse(name)?,
            description: description.filter(|d| !d.trim().is_empty()),
        };
        self.store.insert_permission(record.clone()).await?;
        info!(permission_id = %record.id, name = %record.name, "permission created");
        Ok(record)
    }

    pub async fn delete_permission(&self, id: PermissionId) -> Result<(), CatalogError> {
        self.store.delete_permission(id).await?;
        info!(permission_id = %id, "permission deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, CatalogError> {
        Ok(self.store.list_users().await?)
    }

    pub async fn user(&self, id: UserId) -> Result<UserRecord, CatalogError> {
        self.store.user(id).await?.ok_or(CatalogError::NotFound)
    }

    pub async fn create_user(&self, new: NewUser) -> Result<UserRecord, CatalogError> {
        let email = new.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(CatalogError::Validation("invalid email format".to_string()));
        }
        let name = non_empty(&new.name, "display name")?;
        if let Some(role_id) = new.role_id {
            self.role(role_id).await?;
        }
        let password_hash = self.hasher.hash(&new.password)?;

        let now = Utc::now();
        let record = UserRecord {
            id: UserId::new(),
            name,
            email,
            password_hash,
            role_id: new.role_id,
            legacy_role: new.legacy_role.filter(|r| !r.trim().is_empty()),
            department: new.department.filter(|d| !d.trim().is_empty()),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_user(record.clone()).await?;
        info!(user_id = %record.id, "user created");
        Ok(record)
    }

    /// Set or unset a user's role; takes effect on the user's next request.
    pub async fn assign_role(&self, user_id: UserId, role_id: Option<RoleId>) -> Result<UserRecord, CatalogError> {
        if let Some(role_id) = role_id {
            self.role(role_id).await?;
        }
        self.store.set_user_role(user_id, role_id).await?;
        info!(user_id = %user_id, role_id = ?role_id, "user role changed");
        self.user(user_id).await
    }

    /// Outstanding tokens for the user stop working on their next use.
    pub async fn delete_user(&self, id: UserId) -> Result<(), CatalogError> {
        self.store.delete_user(id).await?;
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Seeding
    // ─────────────────────────────────────────────────────────────────────────

    /// Ensure the built-in permissions, role types and system roles exist.
    ///
    /// Idempotent: records are matched by name and left alone when present.
    pub async fn seed_defaults(&self) -> Result<(), CatalogError> {
        let mut permissions = self.store.list_permissions().await?;
        for (permission, description) in catalog_permissions() {
            if !permissions.iter().any(|p| p.name == permission) {
                let record = self
                    .create_permission(permission.as_str(), Some(description.to_string()))
                    .await?;
                permissions.push(record);
            }
        }

        let mut role_types = self.store.list_role_types().await?;
        let roles = self.store.list_roles().await?;

        for policy in &ROLE_POLICIES {
            let role_type_id = match role_types.iter().find(|t| t.name.eq_ignore_ascii_case(policy.name)) {
                Some(existing) => existing.id,
                None => {
                    let created = self
                        .create_role_type(policy.name, Some(policy.description.to_string()))
                        .await?;
                    let id = created.id;
                    role_types.push(created);
                    id
                }
            };

            if roles.iter().any(|r| r.name.matches(policy.name)) {
                continue;
            }

            let permission_ids = permissions
                .iter()
                .filter(|p| policy.permissions.contains(&p.name))
                .map(|p| p.id)
                .collect();
            self.create_role(NewRole {
                name: policy.name.to_string(),
                description: Some(policy.description.to_string()),
                is_system: true,
                role_type_id,
                permission_ids,
            })
            .await?;
        }

        Ok(())
    }

    /// Create an account with the built-in `admin` role unless the email is taken.
    pub async fn ensure_admin(&self, name: &str, email: &str, password: &str) -> Result<(), CatalogError> {
        let email_normalized = email.trim().to_lowercase();
        let users = self.store.list_users().await?;
        if users.iter().any(|u| u.email == email_normalized) {
            return Ok(());
        }

        let roles = self.store.list_roles().await?;
        let admin = roles
            .iter()
            .find(|r| r.name.matches("admin"))
            .ok_or_else(|| CatalogError::Validation("admin role is missing; seed the catalog first".to_string()))?;

        self.create_user(NewUser {
            name: name.to_string(),
            email: email_normalized,
            password: password.to_string(),
            role_id: Some(admin.id),
            legacy_role: None,
            department: None,
        })
        .await?;
        Ok(())
    }

    async fn ensure_role_type_exists(&self, id: RoleTypeId) -> Result<(), CatalogError> {
        match self.store.role_type(id).await? {
            Some(_) => Ok(()),
            None => Err(CatalogError::Validation(format!("role type {id} does not exist"))),
        }
    }

    async fn known_permissions(&self, ids: Vec<PermissionId>) -> Result<BTreeSet<PermissionId>, CatalogError> {
        let requested: BTreeSet<PermissionId> = ids.into_iter().collect();
        if requested.is_empty() {
            return Ok(requested);
        }
        let known: BTreeSet<PermissionId> = self
            .store
            .list_permissions()
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if let Some(missing) = requested.iter().find(|id| !known.contains(id)) {
            return Err(CatalogError::Validation(format!("permission {missing} does not exist")));
        }
        Ok(requested)
    }
}

fn non_empty(value: &str, field: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}
