//! Administrative catalog surface: role types, roles, permissions and users.
//!
//! Mounted under `/admin` behind the `admin` role gate.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use pipeops_auth::{role_definitions, CatalogError, NewRole, NewUser, RoleUpdate};
use pipeops_core::{PermissionId, RoleId, RoleTypeId, UserId};

use crate::app::dto::{
    parse_id, AssignRoleRequest, CreatePermissionRequest, CreateRoleRequest, CreateRoleTypeRequest,
    CreateUserRequest, PermissionResponse, RoleResponse, RoleTypeResponse, SetPermissionsRequest,
    UpdateRoleRequest, UpdateRoleTypeRequest, UserResponse,
};
use crate::app::{errors, services::AppServices};
use crate::context::SessionContext;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/role-types", get(list_role_types).post(create_role_type))
        .route(
            "/role-types/:id",
            get(get_role_type).put(update_role_type).delete(delete_role_type),
        )
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id", get(get_role).put(update_role).delete(delete_role))
        .route("/roles/:id/permissions", put(set_role_permissions))
        .route("/permissions", get(list_permissions).post(create_permission))
        .route("/permissions/:id", delete(delete_permission))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).delete(delete_user))
        .route("/users/:id/role", put(assign_role))
        .route("/policies", get(list_policies))
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, CatalogError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

fn deleted(result: Result<(), CatalogError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Role types
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/role-types
pub async fn list_role_types(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let result = services.catalog.list_role_types().await;
    respond(
        StatusCode::OK,
        result.map(|types| types.into_iter().map(RoleTypeResponse::from).collect::<Vec<_>>()),
    )
}

/// GET /admin/role-types/:id - Includes the number of roles of this type
pub async fn get_role_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: RoleTypeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let role_type = match services.catalog.role_type(id).await {
        Ok(r) => r,
        Err(e) => return errors::catalog_error_to_response(e),
    };
    let role_count = match services.catalog.count_roles_of_type(id).await {
        Ok(n) => n,
        Err(e) => return errors::catalog_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "role_type": RoleTypeResponse::from(role_type),
            "role_count": role_count,
        })),
    )
        .into_response()
}

/// POST /admin/role-types
pub async fn create_role_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<SessionContext>,
    Json(body): Json<CreateRoleTypeRequest>,
) -> Response {
    let result = services.catalog.create_role_type(&body.name, body.description).await;
    if let Ok(created) = &result {
        info!(actor = %actor.user_id(), role_type_id = %created.id, "admin created role type");
    }
    respond(StatusCode::CREATED, result.map(RoleTypeResponse::from))
}

/// PUT /admin/role-types/:id
pub async fn update_role_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateRoleTypeRequest>,
) -> Response {
    let id: RoleTypeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services
        .catalog
        .update_role_type(id, body.name.as_deref(), body.description)
        .await;
    respond(StatusCode::OK, result.map(RoleTypeResponse::from))
}

/// DELETE /admin/role-types/:id - 409 `referential_conflict` while roles still use the type
pub async fn delete_role_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<SessionContext>,
    Path(id): Path<String>,
) -> Response {
    let id: RoleTypeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services.catalog.delete_role_type(id).await;
    if result.is_ok() {
        info!(actor = %actor.user_id(), role_type_id = %id, "admin deleted role type");
    }
    deleted(result)
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/roles
pub async fn list_roles(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let result = services.catalog.list_roles().await;
    respond(
        StatusCode::OK,
        result.map(|roles| roles.into_iter().map(RoleResponse::from).collect::<Vec<_>>()),
    )
}

/// GET /admin/roles/:id
pub async fn get_role(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    let id: RoleId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.catalog.role(id).await.map(RoleResponse::from))
}

/// POST /admin/roles - Roles created here are never system roles
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateRoleRequest>,
) -> Response {
    let result = services
        .catalog
        .create_role(NewRole {
            name: body.name,
            description: body.description,
            is_system: false,
            role_type_id: body.role_type_id,
            permission_ids: body.permission_ids,
        })
        .await;
    respond(StatusCode::CREATED, result.map(RoleResponse::from))
}

/// PUT /admin/roles/:id
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateRoleRequest>,
) -> Response {
    let id: RoleId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let update = RoleUpdate {
        name: body.name,
        description: body.description,
        role_type_id: body.role_type_id,
    };
    respond(StatusCode::OK, services.catalog.update_role(id, update).await.map(RoleResponse::from))
}

/// PUT /admin/roles/:id/permissions - Replace the permission set
pub async fn set_role_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<SetPermissionsRequest>,
) -> Response {
    let id: RoleId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services.catalog.set_role_permissions(id, body.permission_ids).await;
    respond(StatusCode::OK, result.map(RoleResponse::from))
}

/// DELETE /admin/roles/:id - Users holding the role are left without one
pub async fn delete_role(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    let id: RoleId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    deleted(services.catalog.delete_role(id).await)
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/permissions
pub async fn list_permissions(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let result = services.catalog.list_permissions().await;
    respond(
        StatusCode::OK,
        result.map(|ps| ps.into_iter().map(PermissionResponse::from).collect::<Vec<_>>()),
    )
}

/// POST /admin/permissions
pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreatePermissionRequest>,
) -> Response {
    let result = services.catalog.create_permission(&body.name, body.description).await;
    respond(StatusCode::CREATED, result.map(PermissionResponse::from))
}

/// DELETE /admin/permissions/:id - Also removes the permission from every role
pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: PermissionId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    deleted(services.catalog.delete_permission(id).await)
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/users
pub async fn list_users(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let result = services.catalog.list_users().await;
    respond(
        StatusCode::OK,
        result.map(|users| users.into_iter().map(UserResponse::from).collect::<Vec<_>>()),
    )
}

/// GET /admin/users/:id
pub async fn get_user(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    let id: UserId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.catalog.user(id).await.map(UserResponse::from))
}

/// POST /admin/users
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<SessionContext>,
    Json(body): Json<CreateUserRequest>,
) -> Response {
    let result = services
        .catalog
        .create_user(NewUser {
            name: body.name,
            email: body.email,
            password: body.password,
            role_id: body.role_id,
            legacy_role: body.legacy_role,
            department: body.department,
        })
        .await;
    if let Ok(created) = &result {
        info!(actor = %actor.user_id(), user_id = %created.id, "admin created user");
    }
    respond(StatusCode::CREATED, result.map(UserResponse::from))
}

/// PUT /admin/users/:id/role - Set or clear the user's role
pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(body): Json<AssignRoleRequest>,
) -> Response {
    let id: UserId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services.catalog.assign_role(id, body.role_id).await;
    if result.is_ok() {
        info!(actor = %actor.user_id(), user_id = %id, role_id = ?body.role_id, "admin changed user role");
    }
    respond(StatusCode::OK, result.map(UserResponse::from))
}

/// DELETE /admin/users/:id - Outstanding sessions end on their next request
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<SessionContext>,
    Path(id): Path<String>,
) -> Response {
    let id: UserId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services.catalog.delete_user(id).await;
    if result.is_ok() {
        info!(actor = %actor.user_id(), user_id = %id, "admin deleted user");
    }
    deleted(result)
}

// ─────────────────────────────────────────────────────────────────────────────
// Policies
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/policies - Built-in tiers with rank, permissions and capability flags
pub async fn list_policies() -> impl IntoResponse {
    Json(serde_json::json!({ "policies": role_definitions() }))
}
