use axum::{extract::Extension, response::IntoResponse, Json};
use serde_json::json;

use crate::app::dto::SessionResponse;
use crate::context::SessionContext;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /me - The caller's hydrated session
pub async fn me(Extension(ctx): Extension<SessionContext>) -> impl IntoResponse {
    Json(SessionResponse::from(ctx.session()))
}

/// GET /me/capabilities - Capability flags of the caller's role
pub async fn capabilities(Extension(ctx): Extension<SessionContext>) -> impl IntoResponse {
    Json(json!({
        "role": ctx.role().as_str(),
        "capabilities": ctx.capabilities(),
    }))
}

/// GET /dashboard/access - Dispatch surface (role `dispatcher`, or `admin`)
pub async fn dashboard_access(Extension(ctx): Extension<SessionContext>) -> impl IntoResponse {
    area_granted("dashboard", &ctx)
}

/// GET /reports/access - Reporting surface (role `DOE`, or `admin`)
pub async fn reports_access(Extension(ctx): Extension<SessionContext>) -> impl IntoResponse {
    area_granted("reports", &ctx)
}

fn area_granted(area: &str, ctx: &SessionContext) -> Json<serde_json::Value> {
    Json(json!({
        "area": area,
        "granted": true,
        "user_id": ctx.user_id().to_string(),
        "role": ctx.role().as_str(),
    }))
}
