use axum::Router;

pub mod items;
pub mod movements;
pub mod orders;
pub mod system;

/// Router for all domain endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/items", items::router())
        .nest("/movements", movements::router())
        .nest("/orders", orders::router())
}
