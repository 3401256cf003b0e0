use std::sync::Arc;

use axum::{routing::get, Router};

use pipeops_auth::RequiredRole;

use crate::app::services::AppServices;
use crate::middleware::{require_session, RoleGate};

pub mod admin;
pub mod auth;
pub mod system;

/// The full route tree. Every group except `/auth` and `/health` sits behind the guard.
pub fn router(services: Arc<AppServices>) -> Router {
    let session = Router::new()
        .route("/me", get(system::me))
        .route("/me/capabilities", get(system::capabilities));

    let dashboard = Router::new().route("/dashboard/access", get(system::dashboard_access));
    let reports = Router::new().route("/reports/access", get(system::reports_access));

    Router::new()
        .route("/health", get(system::health))
        .nest("/auth", auth::router())
        .merge(guarded(session, &services, None))
        .merge(guarded(dashboard, &services, Some(RequiredRole::Dispatcher)))
        .merge(guarded(reports, &services, Some(RequiredRole::Doe)))
        .nest("/admin", guarded(admin::router(), &services, Some(RequiredRole::Admin)))
}

fn guarded(routes: Router, services: &Arc<AppServices>, required: Option<RequiredRole>) -> Router {
    routes.route_layer(axum::middleware::from_fn_with_state(
        RoleGate::new(services.clone(), required),
        require_session,
    ))
}
