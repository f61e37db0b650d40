use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};

use netfab_core::OrderId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/stats", get(order_stats))
        .route("/availability", post(check_availability))
        .route("/:id", get(get_order).patch(update_order))
        .route("/:id/state", patch(transition_state))
        .route("/:id/restore", post(restore_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let new_order = match body.validate() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.create_order(new_order, actor.user_id()).await {
        Ok(order) => (StatusCode::CREATED, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListOrdersQuery>,
) -> axum::response::Response {
    let (filter, pagination) = match query.into_filter() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.list_orders(&filter, pagination).await {
        Ok(page) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "items": page.items.iter().map(dto::order_summary_to_json).collect::<Vec<_>>(),
                "total": page.total,
                "pagination": page.pagination,
                "has_more": page.has_more,
            })),
        )
            .into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn order_stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.orders.order_stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orders.get_order(order_id).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn update_order(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateOrderRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let changes = match body.validate() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.update_order(order_id, changes, actor.user_id()).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

/// Read-only: reserves nothing, so no actor is needed.
pub async fn check_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::AvailabilityRequest>,
) -> axum::response::Response {
    let checks = match body.validate() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.check_availability(&checks).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn transition_state(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    Json(body): Json<dto::TransitionStateRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (to, comment) = match body.validate() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .orders
        .transition_state(order_id, to, comment, actor.user_id())
        .await
    {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn restore_order(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .restorer
        .restore_on_cancellation(order_id, actor.user_id())
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "order_id": order_id,
                "restored_lines": outcome.restored_lines(),
                "movements": outcome.movements,
                "already_in_ledger": outcome.already_in_ledger,
            })),
        )
            .into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}
