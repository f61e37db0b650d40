use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use netfab_core::ItemId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_item).get(list_items))
        .route("/alerts", get(stock_alerts))
        .route("/:id", get(get_item).patch(update_item))
        .route("/:id/retire", post(retire_item))
        .route("/:id/reconciliation", get(reconcile_item))
}

pub async fn register_item(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Json(body): Json<dto::CreateItemRequest>,
) -> axum::response::Response {
    let new_item = match body.validate() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.register_item(new_item, actor.user_id()).await {
        Ok(item) => (StatusCode::CREATED, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListItemsQuery>,
) -> axum::response::Response {
    let filter = match query.into_filter() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.list_items(&filter).await {
        Ok(items) => {
            let items: Vec<_> = items.iter().map(dto::item_to_json).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "count": items.len(),
                    "items": items,
                })),
            )
                .into_response()
        }
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog.get_item(item_id).await {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateItemRequest>,
) -> axum::response::Response {
    let item_id: ItemId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let changes = match body.validate() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.update_item(item_id, changes, actor.user_id()).await {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn stock_alerts(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::AlertsQuery>,
) -> axum::response::Response {
    match services.catalog.stock_alerts(query.threshold()).await {
        Ok(alerts) => (StatusCode::OK, Json(dto::alerts_to_json(&alerts))).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn retire_item(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog.retire_item(item_id, actor.user_id()).await {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn reconcile_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.reconcile_item(item_id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}
