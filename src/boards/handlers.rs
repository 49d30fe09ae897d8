use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{BoardFilter, CreateBoardRequest, CreateBoardTaskRequest, UpdateBoardRequest},
    services,
};
use crate::{
    auth::extractors::AuthUser,
    error::ApiError,
    state::AppState,
    store::{Board, BoardId, Task, TaskId, UserId},
    tasks::{dto::StatusFilter, services as task_services},
    users::dto::UserSummary,
};

pub fn board_routes() -> Router<AppState> {
    Router::new()
        .route("/boards", get(list_boards).post(create_board))
        .route(
            "/boards/:id",
            get(get_board).put(update_board).delete(delete_board),
        )
}

pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/boards/:id/users", get(list_members))
        .route(
            "/boards/:id/users/:user_id",
            post(add_member).delete(remove_member),
        )
}

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/boards/:id/tasks", get(list_tasks).post(create_task))
        .route("/boards/:id/tasks/:task_id", delete(remove_task))
}

#[instrument(skip(state, principal, filter))]
pub async fn list_boards(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    filter: Result<Query<BoardFilter>, QueryRejection>,
) -> Result<Json<Vec<Board>>, ApiError> {
    let Query(filter) = filter?;
    let boards = services::list_boards(&*state.store, &principal, filter.name.as_deref()).await?;
    Ok(Json(boards))
}

#[instrument(skip(state, principal, payload))]
pub async fn create_board(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    payload: Result<Json<CreateBoardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Board>), ApiError> {
    let Json(payload) = payload?;
    let board = services::create_board(&*state.store, &principal, payload).await?;
    Ok((StatusCode::CREATED, Json(board)))
}

#[instrument(skip(state, principal, path))]
pub async fn get_board(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<BoardId>, PathRejection>,
) -> Result<Json<Board>, ApiError> {
    let Path(id) = path?;
    Ok(Json(services::get_board(&*state.store, &principal, id).await?))
}

#[instrument(skip(state, principal, payload, path))]
pub async fn update_board(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<BoardId>, PathRejection>,
    payload: Result<Json<UpdateBoardRequest>, JsonRejection>,
) -> Result<Json<Board>, ApiError> {
    let Path(id) = path?;
    let Json(payload) = payload?;
    Ok(Json(
        services::update_board(&*state.store, &principal, id, payload).await?,
    ))
}

#[instrument(skip(state, principal, path))]
pub async fn delete_board(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<BoardId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    services::delete_board(&*state.store, &principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, principal, path))]
pub async fn list_members(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<BoardId>, PathRejection>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let Path(id) = path?;
    Ok(Json(services::list_members(&*state.store, &principal, id).await?))
}

#[instrument(skip(state, principal, path))]
pub async fn add_member(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<(BoardId, UserId)>, PathRejection>,
) -> Result<Json<Board>, ApiError> {
    let Path((id, user_id)) = path?;
    Ok(Json(
        services::add_member(&*state.store, &principal, id, user_id).await?,
    ))
}

#[instrument(skip(state, principal, path))]
pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<(BoardId, UserId)>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path((id, user_id)) = path?;
    services::remove_member(&*state.store, &principal, id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, principal, filter, path))]
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<BoardId>, PathRejection>,
    filter: Result<Query<StatusFilter>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Path(id) = path?;
    let Query(filter) = filter?;
    let tasks = services::list_board_tasks(&*state.store, &principal, id, filter.status).await?;
    Ok(Json(tasks))
}

#[instrument(skip(state, principal, payload, path))]
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<BoardId>, PathRejection>,
    payload: Result<Json<CreateBoardTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Path(id) = path?;
    let Json(payload) = payload?;
    let task = task_services::create_task(
        &*state.store,
        &principal,
        id,
        payload.title,
        payload.description,
        payload.status,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, principal, path))]
pub async fn remove_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<(BoardId, TaskId)>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path((id, task_id)) = path?;
    services::remove_board_task(&*state.store, &principal, id, task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
