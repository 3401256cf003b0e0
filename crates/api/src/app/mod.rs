//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: identity store selection and auth service wiring
//! - `routes/`: HTTP routes + handlers (one file per surface)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::settings::Settings;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(settings: Settings) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(&settings).await?);

    Ok(routes::router(services.clone()).layer(ServiceBuilder::new().layer(Extension(services))))
}
