use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use netfab_core::DomainError;
use netfab_infra::services::CommandError;
use netfab_infra::store::StoreError;

pub fn command_error_to_response(err: CommandError) -> axum::response::Response {
    match err {
        CommandError::Domain(e) => domain_error_to_response(e),
        CommandError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        CommandError::Store(e) => store_error_to_response(e),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", message),
        DomainError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        DomainError::InvalidTransition { from, to } => json_error_with(
            StatusCode::CONFLICT,
            "invalid_transition",
            message,
            json!({ "from": from, "to": to }),
        ),
        DomainError::InsufficientStock {
            item_id,
            available,
            requested,
        } => json_error_with(
            StatusCode::UNPROCESSABLE_ENTITY,
            "insufficient_stock",
            message,
            json!({
                "item_id": item_id,
                "available": available,
                "requested": requested,
            }),
        ),
        DomainError::PartialRestoration { restored, failed } => json_error_with(
            StatusCode::UNPROCESSABLE_ENTITY,
            "partial_restoration",
            message,
            json!({ "restored": restored, "failed": failed }),
        ),
        DomainError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
    }
}

fn store_error_to_response(err: StoreError) -> axum::response::Response {
    tracing::error!(error = %err, "store failure");
    match err {
        StoreError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Backend(_) | StoreError::Corrupt(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            "storage failure",
        ),
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

/// Like [`json_error`], with a structured `details` object.
pub fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    details: serde_json::Value,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "details": details,
        })),
    )
        .into_response()
}

/// Parse a path or body identifier, answering 400 when it is malformed.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.trim().parse().map_err(domain_error_to_response)
}
