//! Sign-in, sign-out, session probe and the error surface.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use pipeops_auth::{ErrorPage, ErrorQuery, Session};

use crate::app::dto::{SessionResponse, SignInRequest, SignInResponse};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::middleware::{append_cookie, attach_refreshed_token, clear_cookie, extract_token, session_cookie};

pub fn router() -> Router {
    Router::new()
        .route("/signin", post(sign_in))
        .route("/signout", post(sign_out))
        .route("/session", get(session))
        .route("/error", get(error_page))
}

/// POST /auth/signin - Verify credentials and issue a session credential
pub async fn sign_in(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<SignInRequest>,
) -> Response {
    let identity = match services.verifier.verify(&body.email, &body.password).await {
        Ok(identity) => identity,
        Err(e) => return errors::sign_in_error_to_response(e),
    };

    let issued = match services.tokens().issue(&identity, Utc::now()) {
        Ok(issued) => issued,
        Err(e) => return errors::sign_in_error_to_response(e),
    };

    let session = Session {
        user_id: identity.id,
        name: identity.name,
        email: identity.email,
        role: identity.role_name,
    };
    info!(user_id = %session.user_id, role = %session.role, "signed in");

    let mut response = (
        StatusCode::OK,
        Json(SignInResponse {
            token: issued.token.clone(),
            expires_at: issued.claims.exp,
            session: SessionResponse::from(&session),
        }),
    )
        .into_response();
    append_cookie(response.headers_mut(), &session_cookie(&services.auth, &issued.token));
    response
}

/// POST /auth/signout - Drop the client credential
///
/// Credentials are signed, not stored, so there is nothing to revoke server-side.
pub async fn sign_out(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    append_cookie(response.headers_mut(), &clear_cookie(&services.auth));
    info!("signed out");
    response
}

/// GET /auth/session - Current session, or `null`; never redirects
pub async fn session(Extension(services): Extension<Arc<AppServices>>, headers: HeaderMap) -> Response {
    let token = extract_token(&headers, &services.auth.cookie_name);

    match services.guard.current_session(token).await {
        Some(authorized) => {
            let mut response = Json(SessionResponse::from(&authorized.session)).into_response();
            if let Some(refreshed) = authorized.refreshed_token {
                attach_refreshed_token(response.headers_mut(), &services.auth, &refreshed);
            }
            response
        }
        None => {
            let mut response = Json(serde_json::Value::Null).into_response();
            if token.is_some() {
                append_cookie(response.headers_mut(), &clear_cookie(&services.auth));
            }
            response
        }
    }
}

/// GET /auth/error - Message for an error surface redirect
pub async fn error_page(Query(query): Query<ErrorQuery>) -> impl IntoResponse {
    let page = ErrorPage::from(&query);
    Json(json!({
        "error": page.kind(),
        "message": page.message(),
    }))
}
