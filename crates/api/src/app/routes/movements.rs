use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use netfab_core::MovementId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_movement).get(list_movements))
        .route("/stats", get(movement_stats))
        .route("/:id", get(get_movement))
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Json(body): Json<dto::RecordMovementRequest>,
) -> axum::response::Response {
    let request = match body.validate() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.ledger.record_movement(request, actor.user_id()).await {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListMovementsQuery>,
) -> axum::response::Response {
    let (filter, pagination) = match query.into_filter() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.ledger.list_movements(&filter, pagination).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn get_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let movement_id: MovementId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.get_movement(movement_id).await {
        Ok(entry) => (StatusCode::OK, Json(entry)).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn movement_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::StatsRangeQuery>,
) -> axum::response::Response {
    match services.ledger.movement_stats(query.from, query.to).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}
