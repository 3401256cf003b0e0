//! Postgres-backed identity store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | Result |
//! |------------|----------------------|--------|
//! | Database (unique violation) | `23505` | `CatalogError::Conflict` |
//! | Database (foreign key violation) | `23503` | `CatalogError::Validation` |
//! | anything else | any | `StoreError::Unavailable` |
//!
//! ## Referential guard
//!
//! `delete_role_type` locks the role type row (`FOR UPDATE`) before counting
//! dependents. Inserting a role takes a key-share lock on the referenced row
//! through the foreign key, so no role can be attached between the count and
//! the delete.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use pipeops_auth::{
    CatalogError, CatalogStore, Identity, IdentityStore, Permission, PermissionRecord, RoleName,
    RoleRecord, RoleTypeRecord, StoreError, UserRecord,
};
use pipeops_core::{PermissionId, RoleId, RoleTypeId, UserId};

/// Schema for the identity tables. Every statement is idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS role_types (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE UNIQUE INDEX IF NOT EXISTS role_types_name_ci ON role_types (lower(name));
CREATE TABLE IF NOT EXISTS permissions (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT
);
CREATE TABLE IF NOT EXISTS roles (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    is_system BOOLEAN NOT NULL DEFAULT FALSE,
    role_type_id UUID NOT NULL REFERENCES role_types (id) ON DELETE RESTRICT
);
CREATE UNIQUE INDEX IF NOT EXISTS roles_name_ci ON roles (lower(name));
CREATE TABLE IF NOT EXISTS role_permissions (
    role_id UUID NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
    permission_id UUID NOT NULL REFERENCES permissions (id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, permission_id)
);
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role_id UUID REFERENCES roles (id) ON DELETE SET NULL,
    legacy_role TEXT,
    department TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)
"#;

pub struct PostgresIdentityStore {
    pool: Arc<PgPool>,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| store_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the identity tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| store_error("migrate", e))?;
        }
        Ok(())
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool.begin().await.map_err(|e| store_error(operation, e))
    }

    async fn permissions_by_role(&self) -> Result<BTreeMap<Uuid, BTreeSet<PermissionId>>, StoreError> {
        let rows = sqlx::query("SELECT role_id, permission_id FROM role_permissions")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| store_error("permissions_by_role", e))?;

        let mut map: BTreeMap<Uuid, BTreeSet<PermissionId>> = BTreeMap::new();
        for row in rows {
            let role_id: Uuid = row.try_get("role_id").map_err(corrupt)?;
            let permission_id: Uuid = row.try_get("permission_id").map_err(corrupt)?;
            map.entry(role_id).or_default().insert(PermissionId::from_uuid(permission_id));
        }
        Ok(map)
    }
}

#[async_trait::async_trait]
impl IdentityStore for PostgresIdentityStore {
    #[instrument(skip(self, email))]
    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                u.id, u.name, u.email, u.password_hash, u.role_id, u.legacy_role,
                u.department, u.created_at, u.updated_at,
                r.name AS role_name,
                r.description AS role_description,
                r.is_system AS role_is_system,
                r.role_type_id AS role_type_id,
                COALESCE(
                    array_agg(rp.permission_id) FILTER (WHERE rp.permission_id IS NOT NULL),
                    '{}'::uuid[]
                ) AS permission_ids
            FROM users u
            LEFT JOIN roles r ON r.id = u.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            WHERE u.email = $1
            GROUP BY u.id, r.id
            "#,
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| store_error("identity_by_email", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user = user_from_row(&row).map_err(corrupt)?;
        let role = match user.role_id {
            Some(role_id) => {
                let name: String = row.try_get("role_name").map_err(corrupt)?;
                let permission_ids: Vec<Uuid> = row.try_get("permission_ids").map_err(corrupt)?;
                Some(RoleRecord {
                    id: role_id,
                    name: RoleName::new(name),
                    description: row.try_get("role_description").map_err(corrupt)?,
                    is_system: row.try_get("role_is_system").map_err(corrupt)?,
                    role_type_id: RoleTypeId::from_uuid(row.try_get("role_type_id").map_err(corrupt)?),
                    permission_ids: permission_ids.into_iter().map(PermissionId::from_uuid).collect(),
                })
            }
            None => None,
        };

        Ok(Some(Identity { user, role }))
    }
}

#[async_trait::async_trait]
impl CatalogStore for PostgresIdentityStore {
    async fn list_role_types(&self) -> Result<Vec<RoleTypeRecord>, StoreError> {
        let rows = sqlx::query("SELECT id, name, description, created_at FROM role_types ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| store_error("list_role_types", e))?;
        rows.iter().map(|r| role_type_from_row(r).map_err(corrupt)).collect()
    }

    async fn role_type(&self, id: RoleTypeId) -> Result<Option<RoleTypeRecord>, StoreError> {
        let row = sqlx::query("SELECT id, name, description, created_at FROM role_types WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| store_error("role_type", e))?;
        row.map(|r| role_type_from_row(&r).map_err(corrupt)).transpose()
    }

    async fn insert_role_type(&self, record: RoleTypeRecord) -> Result<(), CatalogError> {
        sqlx::query("INSERT INTO role_types (id, name, description, created_at) VALUES ($1, $2, $3, $4)")
            .bind(record.id.as_uuid())
            .bind(&record.name)
            .bind(&record.description)
            .bind(record.created_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| catalog_error("insert_role_type", e))?;
        Ok(())
    }

    async fn update_role_type(&self, record: RoleTypeRecord) -> Result<(), CatalogError> {
        let result = sqlx::query("UPDATE role_types SET name = $2, description = $3 WHERE id = $1")
            .bind(record.id.as_uuid())
            .bind(&record.name)
            .bind(&record.description)
            .execute(&*self.pool)
            .await
            .map_err(|e| catalog_error("update_role_type", e))?;
        found(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn delete_role_type(&self, id: RoleTypeId) -> Result<(), CatalogError> {
        let mut tx = self.begin("delete_role_type").await?;

        let locked = sqlx::query("SELECT id FROM role_types WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| catalog_error("delete_role_type", e))?;
        if locked.is_none() {
            return Err(CatalogError::NotFound);
        }

        let count: i64 = sqlx::query("SELECT COUNT(*) AS dependents FROM roles WHERE role_type_id = $1")
            .bind(id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| catalog_error("delete_role_type", e))?
            .try_get("dependents")
            .map_err(corrupt)?;
        if count > 0 {
            // Dropping `tx` rolls back.
            return Err(CatalogError::ReferentialConflict { dependents: count as usize });
        }

        sqlx::query("DELETE FROM role_types WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| catalog_error("delete_role_type", e))?;
        tx.commit().await.map_err(|e| catalog_error("delete_role_type", e))?;
        Ok(())
    }

    async fn count_roles_of_type(&self, id: RoleTypeId) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS dependents FROM roles WHERE role_type_id = $1")
            .bind(id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| store_error("count_roles_of_type", e))?
            .try_get("dependents")
            .map_err(corrupt)?;
        Ok(count as usize)
    }

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, StoreError> {
        let rows = sqlx::query("SELECT id, name, description, is_system, role_type_id FROM roles ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| store_error("list_roles", e))?;
        let mut permissions = self.permissions_by_role().await?;

        rows.iter()
            .map(|row| {
                let mut role = role_from_row(row).map_err(corrupt)?;
                role.permission_ids = permissions.remove(role.id.as_uuid()).unwrap_or_default();
                Ok(role)
            })
            .collect()
    }

    async fn role(&self, id: RoleId) -> Result<Option<RoleRecord>, StoreError> {
        let row = sqlx::query("SELECT id, name, description, is_system, role_type_id FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| store_error("role", e))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut role = role_from_row(&row).map_err(corrupt)?;
        let permission_rows = sqlx::query("SELECT permission_id FROM role_permissions WHERE role_id = $1")
            .bind(id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| store_error("role", e))?;
        for r in permission_rows {
            let permission_id: Uuid = r.try_get("permission_id").map_err(corrupt)?;
            role.permission_ids.insert(PermissionId::from_uuid(permission_id));
        }
        Ok(Some(role))
    }

    async fn insert_role(&self, record: RoleRecord) -> Result<(), CatalogError> {
        let mut tx = self.begin("insert_role").await?;
        sqlx::query(
            "INSERT INTO roles (id, name, description, is_system, role_type_id) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.id.as_uuid())
        .bind(record.name.as_str())
        .bind(&record.description)
        .bind(record.is_system)
        .bind(record.role_type_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| catalog_error("insert_role", e))?;

        insert_role_permissions(&mut tx, record.id, &record.permission_ids).await?;
        tx.commit().await.map_err(|e| catalog_error("insert_role", e))?;
        Ok(())
    }

    async fn update_role(&self, record: RoleRecord) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "UPDATE roles SET name = $2, description = $3, role_type_id = $4 WHERE id = $1",
        )
        .bind(record.id.as_uuid())
        .bind(record.name.as_str())
        .bind(&record.description)
        .bind(record.role_type_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| catalog_error("update_role", e))?;
        found(result.rows_affected())
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), CatalogError> {
        // users.role_id is ON DELETE SET NULL.
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| catalog_error("delete_role", e))?;
        found(result.rows_affected())
    }

    async fn set_role_permissions(
        &self,
        id: RoleId,
        permissions: BTreeSet<PermissionId>,
    ) -> Result<(), CatalogError> {
        let mut tx = self.begin("set_role_permissions").await?;

        let locked = sqlx::query("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| catalog_error("set_role_permissions", e))?;
        if locked.is_none() {
            return Err(CatalogError::NotFound);
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| catalog_error("set_role_permissions", e))?;
        insert_role_permissions(&mut tx, id, &permissions).await?;

        tx.commit().await.map_err(|e| catalog_error("set_role_permissions", e))?;
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        let rows = sqlx::query("SELECT id, name, description FROM permissions ORDER BY name")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| store_error("list_permissions", e))?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name").map_err(corrupt)?;
                Ok(PermissionRecord {
                    id: PermissionId::from_uuid(row.try_get("id").map_err(corrupt)?),
                    name: Permission::parse(&name).map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    description: row.try_get("description").map_err(corrupt)?,
                })
            })
            .collect()
    }

    async fn insert_permission(&self, record: PermissionRecord) -> Result<(), CatalogError> {
        sqlx::query("INSERT INTO permissions (id, name, description) VALUES ($1, $2, $3)")
            .bind(record.id.as_uuid())
            .bind(record.name.as_str())
            .bind(&record.description)
            .execute(&*self.pool)
            .await
            .map_err(|e| catalog_error("insert_permission", e))?;
        Ok(())
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<(), CatalogError> {
        // role_permissions rows cascade.
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| catalog_error("delete_permission", e))?;
        found(result.rows_affected())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| store_error("list_users", e))?;
        rows.iter().map(|r| user_from_row(r).map_err(corrupt)).collect()
    }

    async fn user(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| store_error("user", e))?;
        row.map(|r| user_from_row(&r).map_err(corrupt)).transpose()
    }

    async fn insert_user(&self, record: UserRecord) -> Result<(), CatalogError> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(record.id.as_uuid())
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(record.role_id.map(Uuid::from))
        .bind(&record.legacy_role)
        .bind(&record.department)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| catalog_error("insert_user", e))?;
        Ok(())
    }

    async fn set_user_role(&self, id: UserId, role_id: Option<RoleId>) -> Result<(), CatalogError> {
        let result = sqlx::query("UPDATE users SET role_id = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(role_id.map(Uuid::from))
            .bind(Utc::now())
            .execute(&*self.pool)
            .await
            .map_err(|e| catalog_error("set_user_role", e))?;
        found(result.rows_affected())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), CatalogError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| catalog_error("delete_user", e))?;
        found(result.rows_affected())
    }
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role_id, legacy_role, department, created_at, updated_at";

async fn insert_role_permissions(
    tx: &mut Transaction<'static, Postgres>,
    role_id: RoleId,
    permissions: &BTreeSet<PermissionId>,
) -> Result<(), CatalogError> {
    for permission_id in permissions {
        sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)")
            .bind(role_id.as_uuid())
            .bind(permission_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| catalog_error("insert_role_permissions", e))?;
    }
    Ok(())
}

fn found(rows_affected: u64) -> Result<(), CatalogError> {
    if rows_affected == 0 {
        Err(CatalogError::NotFound)
    } else {
        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    let role_id: Option<Uuid> = row.try_get("role_id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
    Ok(UserRecord {
        id: UserId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role_id: role_id.map(RoleId::from_uuid),
        legacy_role: row.try_get("legacy_role")?,
        department: row.try_get("department")?,
        created_at,
        updated_at,
    })
}

fn role_type_from_row(row: &PgRow) -> Result<RoleTypeRecord, sqlx::Error> {
    Ok(RoleTypeRecord {
        id: RoleTypeId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<RoleRecord, sqlx::Error> {
    let name: String = row.try_get("name")?;
    Ok(RoleRecord {
        id: RoleId::from_uuid(row.try_get("id")?),
        name: RoleName::new(name),
        description: row.try_get("description")?,
        is_system: row.try_get("is_system")?,
        role_type_id: RoleTypeId::from_uuid(row.try_get("role_type_id")?),
        permission_ids: BTreeSet::new(),
    })
}

fn corrupt(err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn store_error(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("{operation}: {err}"))
}

fn catalog_error(operation: &str, err: sqlx::Error) -> CatalogError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => {
                return CatalogError::Conflict(format!("{operation}: {}", db_err.message()));
            }
            Some("23503") => {
                return CatalogError::Validation(format!("{operation}: referenced record does not exist"));
            }
            _ => {}
        }
    }
    CatalogError::Store(store_error(operation, err))
}
