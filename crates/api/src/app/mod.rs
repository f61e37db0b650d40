//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store connection and the application services
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs, query parameters and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use netfab_infra::store::Store;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over an already opened store.
pub fn build_app(store: Arc<dyn Store>) -> Router {
    let services = Arc::new(services::AppServices::new(store));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::trace_requests))
                .layer(Extension(services)),
        )
}
