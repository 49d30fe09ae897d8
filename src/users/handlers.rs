use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{SearchQuery, UpdateUserRequest, UserSummary},
    services,
};
use crate::{
    auth::extractors::AuthUser,
    error::ApiError,
    state::AppState,
    store::{UserId, UserRecord},
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/search", get(search_users))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route(
        "/users/:id",
        get(get_user).put(update_user).delete(delete_user),
    )
}

#[instrument(skip(state, principal))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<Vec<UserRecord>>, ApiError> {
    Ok(Json(services::list_users(&*state.store, &principal).await?))
}

#[instrument(skip(state, _principal, query))]
pub async fn search_users(
    State(state): State<AppState>,
    AuthUser(_principal): AuthUser,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let Query(query) = query?;
    let found =
        services::search_users(&*state.store, &query.username, query.effective_limit()).await?;
    Ok(Json(found))
}

#[instrument(skip(state, principal, path))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<UserId>, PathRejection>,
) -> Result<Json<UserRecord>, ApiError> {
    let Path(id) = path?;
    Ok(Json(services::get_user(&*state.store, &principal, id).await?))
}

#[instrument(skip(state, principal, payload, path))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<UserId>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserRecord>, ApiError> {
    let Path(id) = path?;
    let Json(payload) = payload?;
    let user =
        services::update_user(&*state.store, &*state.hasher, &principal, id, payload).await?;
    Ok(Json(user))
}

#[instrument(skip(state, principal, path))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<UserId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    services::delete_user(&*state.store, &principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
