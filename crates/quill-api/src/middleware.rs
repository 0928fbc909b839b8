use axum::{RequestPartsExt, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::debug;

use quill_types::models::User;

use crate::error::ApiError;
use crate::state::AppState;

/// The identity behind a valid access token. Taking this as a handler
/// argument makes the route require `Authorization: Bearer <access token>`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ApiError::Unauthorized)?;

        let token = bearer.token().to_owned();
        let tokens = state.tokens.clone();
        let users = state.users.clone();

        // Identity lookup hits the DB
        let resolved = tokio::task::spawn_blocking(move || tokens.resolve_identity(&token, &users))
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;

        match resolved {
            Ok(user) => Ok(Self(user)),
            Err(e) => {
                debug!("Rejected bearer token: {}", e);
                Err(e.into())
            }
        }
    }
}

/// Owner-gated mutations answer 404 to everyone but the owner.
pub(crate) fn ensure_owner(
    owner_id: uuid::Uuid,
    user: &User,
    what: &'static str,
) -> Result<(), ApiError> {
    if owner_id == user.id {
        Ok(())
    } else {
        Err(ApiError::NotFound(what))
    }
}
