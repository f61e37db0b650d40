use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::Response,
};

use netfab_core::UserId;

use crate::app::errors;

/// Header carrying the acting user's id.
pub const ACTOR_HEADER: &str = "x-user-id";

/// Acting user for a request, recorded on ledger entries and state changes.
///
/// Required by every mutating route; read-only routes do not ask for it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    user_id: UserId,
}

impl ActorContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| {
                errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "missing_actor",
                    format!("{ACTOR_HEADER} header is required"),
                )
            })?
            .to_str()
            .map_err(|_| {
                errors::json_error(StatusCode::BAD_REQUEST, "invalid_actor", "actor header is not valid text")
            })?;

        let user_id: UserId = raw
            .trim()
            .parse()
            .map_err(|e: netfab_core::DomainError| {
                errors::json_error(StatusCode::BAD_REQUEST, "invalid_actor", e.to_string())
            })?;
        Ok(Self::new(user_id))
    }
}
