use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::{error::AuthError, principal::Principal};
use crate::error::ApiError;

/// The authenticated caller, as attached by the gate.
pub struct AuthUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // absent only when a protected handler is mounted outside the gate
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AuthError::MissingCredentials.into())
    }
}
