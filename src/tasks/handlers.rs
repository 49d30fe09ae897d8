use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{CreateTaskRequest, StatusFilter, UpdateTaskRequest},
    services,
};
use crate::{
    auth::extractors::AuthUser,
    boards::services as board_services,
    error::ApiError,
    state::AppState,
    store::{BoardId, Task, TaskId, UserId},
    users::dto::UserSummary,
};

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(create_task))
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
}

pub fn assignment_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks/:id/users", get(get_assignee).delete(unassign_task))
        .route("/tasks/:id/users/:user_id", post(assign_task))
}

pub fn query_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks/board/:board_id", get(tasks_for_board))
        .route("/tasks/user/:user_id", get(tasks_for_user))
}

#[instrument(skip(state, principal, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(payload) = payload?;
    let task = services::create_task(
        &*state.store,
        &principal,
        payload.board_id,
        payload.title,
        payload.description,
        payload.status,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, principal, path))]
pub async fn get_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<TaskId>, PathRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = path?;
    Ok(Json(services::get_task(&*state.store, &principal, id).await?))
}

#[instrument(skip(state, principal, payload, path))]
pub async fn update_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<TaskId>, PathRejection>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = path?;
    let Json(payload) = payload?;
    Ok(Json(
        services::update_task(&*state.store, &principal, id, payload).await?,
    ))
}

#[instrument(skip(state, principal, path))]
pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<TaskId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    services::delete_task(&*state.store, &principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, principal, path))]
pub async fn assign_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<(TaskId, UserId)>, PathRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path((id, user_id)) = path?;
    Ok(Json(
        services::assign_task(&*state.store, &principal, id, user_id).await?,
    ))
}

#[instrument(skip(state, principal, path))]
pub async fn unassign_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<TaskId>, PathRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = path?;
    Ok(Json(services::unassign_task(&*state.store, &principal, id).await?))
}

#[instrument(skip(state, principal, path))]
pub async fn get_assignee(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<TaskId>, PathRejection>,
) -> Result<Json<UserSummary>, ApiError> {
    let Path(id) = path?;
    Ok(Json(services::task_assignee(&*state.store, &principal, id).await?))
}

#[instrument(skip(state, principal, filter, path))]
pub async fn tasks_for_board(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<BoardId>, PathRejection>,
    filter: Result<Query<StatusFilter>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Path(board_id) = path?;
    let Query(filter) = filter?;
    let tasks =
        board_services::list_board_tasks(&*state.store, &principal, board_id, filter.status)
            .await?;
    Ok(Json(tasks))
}

#[instrument(skip(state, principal, path))]
pub async fn tasks_for_user(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    path: Result<Path<UserId>, PathRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Path(user_id) = path?;
    Ok(Json(
        services::tasks_for_user(&*state.store, &principal, user_id).await?,
    ))
}
