use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use pipeops_auth::{AuthError, CatalogError};

pub fn catalog_error_to_response(err: CatalogError) -> axum::response::Response {
    match err {
        CatalogError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        CatalogError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        CatalogError::ReferentialConflict { dependents } => json_error(
            StatusCode::CONFLICT,
            "referential_conflict",
            format!("still referenced by {dependents} role(s); reassign or delete them first"),
        ),
        CatalogError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        CatalogError::Store(e) => {
            error!(error = %e, "catalog store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "identity store unavailable")
        }
    }
}

/// Sign-in failures. Unknown email and wrong password share one response.
pub fn sign_in_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::Store(e) => {
            error!(error = %e, "identity store failure during sign-in");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "identity store unavailable")
        }
        AuthError::Token(e) => {
            error!(error = %e, "failed to sign session token");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "token_error", "could not issue session")
        }
        _ => json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "Invalid email or password"),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
