use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pipeops_auth::{
    Capabilities, PermissionRecord, RoleRecord, RoleTypeRecord, Session, UserRecord,
};
use pipeops_core::{DomainError, PermissionId, RoleId, RoleTypeId, UserId};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleTypeRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleTypeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
    pub role_type_id: RoleTypeId,
    #[serde(default)]
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub role_type_id: Option<RoleTypeId>,
}

#[derive(Debug, Deserialize)]
pub struct SetPermissionsRequest {
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: Option<RoleId>,
    pub legacy_role: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: Option<RoleId>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub role: String,
    pub capabilities: Capabilities,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            name: session.name.clone(),
            email: session.email.clone(),
            role: session.role.as_str().to_string(),
            capabilities: session.capabilities(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub session: SessionResponse,
}

#[derive(Debug, Serialize)]
pub struct RoleTypeResponse {
    pub id: RoleTypeId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<RoleTypeRecord> for RoleTypeResponse {
    fn from(r: RoleTypeRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub role_type_id: RoleTypeId,
    pub permission_ids: Vec<PermissionId>,
}

impl From<RoleRecord> for RoleResponse {
    fn from(r: RoleRecord) -> Self {
        Self {
            id: r.id,
            name: r.name.as_str().to_string(),
            description: r.description,
            is_system: r.is_system,
            role_type_id: r.role_type_id,
            permission_ids: r.permission_ids.into_iter().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub id: PermissionId,
    pub name: String,
    pub description: Option<String>,
}

impl From<PermissionRecord> for PermissionResponse {
    fn from(p: PermissionRecord) -> Self {
        Self {
            id: p.id,
            name: p.name.as_str().to_string(),
            description: p.description,
        }
    }
}

/// User as shown to administrators. Never includes the password hash.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role_id: Option<RoleId>,
    pub legacy_role: Option<String>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for UserResponse {
    fn from(u: UserRecord) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role_id: u.role_id,
            legacy_role: u.legacy_role,
            department: u.department,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.parse::<T>()
        .map_err(|e| errors::json_error(axum::http::StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
