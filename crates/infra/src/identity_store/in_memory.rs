use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use pipeops_auth::{
    CatalogError, CatalogStore, Identity, IdentityStore, PermissionRecord, RoleRecord, RoleTypeRecord,
    StoreError, UserRecord,
};
use pipeops_core::{PermissionId, RoleId, RoleTypeId, UserId};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, UserRecord>,
    roles: BTreeMap<RoleId, RoleRecord>,
    role_types: BTreeMap<RoleTypeId, RoleTypeRecord>,
    permissions: BTreeMap<PermissionId, PermissionRecord>,
}

impl Tables {
    fn dependents_of(&self, id: RoleTypeId) -> usize {
        self.roles.values().filter(|r| r.role_type_id == id).count()
    }
}

/// In-memory identity store.
///
/// Intended for tests/dev. All tables sit behind one lock so that every
/// check-then-write (uniqueness, referential guard) is atomic.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    tables: RwLock<Tables>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let tables = self.read()?;
        let Some(user) = tables.users.values().find(|u| u.email == email) else {
            return Ok(None);
        };
        let role = user.role_id.and_then(|id| tables.roles.get(&id)).cloned();
        Ok(Some(Identity {
            user: user.clone(),
            role,
        }))
    }
}

#[async_trait::async_trait]
impl CatalogStore for InMemoryIdentityStore {
    async fn list_role_types(&self) -> Result<Vec<RoleTypeRecord>, StoreError> {
        Ok(self.read()?.role_types.values().cloned().collect())
    }

    async fn role_type(&self, id: RoleTypeId) -> Result<Option<RoleTypeRecord>, StoreError> {
        Ok(self.read()?.role_types.get(&id).cloned())
    }

    async fn insert_role_type(&self, record: RoleTypeRecord) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if tables
            .role_types
            .values()
            .any(|t| t.name.to_lowercase() == record.name.to_lowercase())
        {
            return Err(CatalogError::Conflict(format!("role type '{}' already exists", record.name)));
        }
        tables.role_types.insert(record.id, record);
        Ok(())
    }

    async fn update_role_type(&self, record: RoleTypeRecord) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if !tables.role_types.contains_key(&record.id) {
            return Err(CatalogError::NotFound);
        }
        if tables
            .role_types
            .values()
            .any(|t| t.id != record.id && t.name.to_lowercase() == record.name.to_lowercase())
        {
            return Err(CatalogError::Conflict(format!("role type '{}' already exists", record.name)));
        }
        tables.role_types.insert(record.id, record);
        Ok(())
    }

    async fn delete_role_type(&self, id: RoleTypeId) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if !tables.role_types.contains_key(&id) {
            return Err(CatalogError::NotFound);
        }
        let dependents = tables.dependents_of(id);
        if dependents > 0 {
            return Err(CatalogError::ReferentialConflict { dependents });
        }
        tables.role_types.remove(&id);
        Ok(())
    }

    async fn count_roles_of_type(&self, id: RoleTypeId) -> Result<usize, StoreError> {
        Ok(self.read()?.dependents_of(id))
    }

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, StoreError> {
        Ok(self.read()?.roles.values().cloned().collect())
    }

    async fn role(&self, id: RoleId) -> Result<Option<RoleRecord>, StoreError> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn insert_role(&self, record: RoleRecord) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if tables.roles.values().any(|r| r.name == record.name) {
            return Err(CatalogError::Conflict(format!("role '{}' already exists", record.name)));
        }
        if !tables.role_types.contains_key(&record.role_type_id) {
            return Err(CatalogError::Validation(format!(
                "role type {} does not exist",
                record.role_type_id
            )));
        }
        tables.roles.insert(record.id, record);
        Ok(())
    }

    async fn update_role(&self, record: RoleRecord) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if !tables.roles.contains_key(&record.id) {
            return Err(CatalogError::NotFound);
        }
        if tables.roles.values().any(|r| r.id != record.id && r.name == record.name) {
            return Err(CatalogError::Conflict(format!("role '{}' already exists", record.name)));
        }
        if !tables.role_types.contains_key(&record.role_type_id) {
            return Err(CatalogError::Validation(format!(
                "role type {} does not exist",
                record.role_type_id
            )));
        }
        tables.roles.insert(record.id, record);
        Ok(())
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if tables.roles.remove(&id).is_none() {
            return Err(CatalogError::NotFound);
        }
        let now = Utc::now();
        for user in tables.users.values_mut().filter(|u| u.role_id == Some(id)) {
            user.role_id = None;
            user.updated_at = now;
        }
        Ok(())
    }

    async fn set_role_permissions(
        &self,
        id: RoleId,
        permissions: BTreeSet<PermissionId>,
    ) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if let Some(missing) = permissions.iter().find(|p| !tables.permissions.contains_key(*p)) {
            return Err(CatalogError::Validation(format!("permission {missing} does not exist")));
        }
        let role = tables.roles.get_mut(&id).ok_or(CatalogError::NotFound)?;
        role.permission_ids = permissions;
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        Ok(self.read()?.permissions.values().cloned().collect())
    }

    async fn insert_permission(&self, record: PermissionRecord) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if tables.permissions.values().any(|p| p.name == record.name) {
            return Err(CatalogError::Conflict(format!("permission '{}' already exists", record.name)));
        }
        tables.permissions.insert(record.id, record);
        Ok(())
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if tables.permissions.remove(&id).is_none() {
            return Err(CatalogError::NotFound);
        }
        for role in tables.roles.values_mut() {
            role.permission_ids.remove(&id);
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        Ok(self.read()?.users.values().cloned().collect())
    }

    async fn user(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn insert_user(&self, record: UserRecord) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.email == record.email) {
            return Err(CatalogError::Conflict(format!("email '{}' is already registered", record.email)));
        }
        if let Some(role_id) = record.role_id {
            if !tables.roles.contains_key(&role_id) {
                return Err(CatalogError::Validation(format!("role {role_id} does not exist")));
            }
        }
        tables.users.insert(record.id, record);
        Ok(())
    }

    async fn set_user_role(&self, id: UserId, role_id: Option<RoleId>) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        if let Some(role_id) = role_id {
            if !tables.roles.contains_key(&role_id) {
                return Err(CatalogError::Validation(format!("role {role_id} does not exist")));
            }
        }
        let user = tables.users.get_mut(&id).ok_or(CatalogError::NotFound)?;
        user.role_id = role_id;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), CatalogError> {
        let mut tables = self.write()?;
        tables.users.remove(&id).map(|_| ()).ok_or(CatalogError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeops_auth::RoleName;

    fn role_type(name: &str) -> RoleTypeRecord {
        RoleTypeRecord {
            id: RoleTypeId::new(),
            name: name.to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    fn role(name: &'static str, role_type_id: RoleTypeId) -> RoleRecord {
        RoleRecord {
            id: RoleId::new(),
            name: RoleName::new(name),
            description: None,
            is_system: false,
            role_type_id,
            permission_ids: BTreeSet::new(),
        }
    }

    fn user(email: &str, role_id: Option<RoleId>) -> UserRecord {
        let now = Utc::now();
        UserRecord {
            id: UserId::new(),
            name: "Tank Farm".to_string(),
            email: email.to_string(),
            password_hash: "x".to_string(),
            role_id,
            legacy_role: None,
            department: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn role_type_with_dependents_is_not_deleted() {
        let store = InMemoryIdentityStore::new();
        let dispatcher = role_type("dispatcher");
        store.insert_role_type(dispatcher.clone()).await.unwrap();
        store.insert_role(role("dispatcher", dispatcher.id)).await.unwrap();
        store.insert_role(role("night-dispatcher", dispatcher.id)).await.unwrap();

        let err = store.delete_role_type(dispatcher.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::ReferentialConflict { dependents: 2 }));
        assert!(store.role_type(dispatcher.id).await.unwrap().is_some());
        assert_eq!(store.count_roles_of_type(dispatcher.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn role_type_without_dependents_is_deleted() {
        let store = InMemoryIdentityStore::new();
        let unused = role_type("contractor");
        store.insert_role_type(unused.clone()).await.unwrap();

        store.delete_role_type(unused.id).await.unwrap();
        assert!(store.role_type(unused.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_role_type(unused.id).await.unwrap_err(),
            CatalogError::NotFound
        ));
    }

    #[tokio::test]
    async fn role_names_are_unique_ignoring_case() {
        let store = InMemoryIdentityStore::new();
        let doe = role_type("DOE");
        store.insert_role_type(doe.clone()).await.unwrap();
        store.insert_role(role("DOE", doe.id)).await.unwrap();

        let err = store.insert_role(role("doe", doe.id)).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));

        let err = store.insert_role_type(role_type("doe")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn identity_lookup_joins_role() {
        let store = InMemoryIdentityStore::new();
        let doe = role_type("DOE");
        store.insert_role_type(doe.clone()).await.unwrap();
        let doe_role = role("DOE", doe.id);
        store.insert_role(doe_role.clone()).await.unwrap();
        store.insert_user(user("inspector@example.com", Some(doe_role.id))).await.unwrap();

        let identity = store.identity_by_email("inspector@example.com").await.unwrap().unwrap();
        assert_eq!(identity.role_name().map(RoleName::as_str), Some("DOE"));
        assert!(store.identity_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_role_unsets_it_on_users() {
        let store = InMemoryIdentityStore::new();
        let rt = role_type("dispatcher");
        store.insert_role_type(rt.clone()).await.unwrap();
        let r = role("dispatcher", rt.id);
        store.insert_role(r.clone()).await.unwrap();
        let u = user("desk@example.com", Some(r.id));
        store.insert_user(u.clone()).await.unwrap();

        store.delete_role(r.id).await.unwrap();

        assert_eq!(store.user(u.id).await.unwrap().unwrap().role_id, None);
        let identity = store.identity_by_email("desk@example.com").await.unwrap().unwrap();
        assert!(identity.role.is_none());
    }

    #[tokio::test]
    async fn deleting_a_permission_removes_it_from_roles() {
        let store = InMemoryIdentityStore::new();
        let rt = role_type("admin");
        store.insert_role_type(rt.clone()).await.unwrap();
        let permission = PermissionRecord {
            id: PermissionId::new(),
            name: pipeops_auth::Permission::parse("tanks.manage").unwrap(),
            description: None,
        };
        store.insert_permission(permission.clone()).await.unwrap();
        let mut r = role("admin", rt.id);
        r.permission_ids.insert(permission.id);
        store.insert_role(r.clone()).await.unwrap();

        store.delete_permission(permission.id).await.unwrap();

        assert!(store.role(r.id).await.unwrap().unwrap().permission_ids.is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryIdentityStore::new();
        store.insert_user(user("ops@example.com", None)).await.unwrap();
        let err = store.insert_user(user("ops@example.com", None)).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }
}
