use tracing::info;

use super::dto::{CreateBoardRequest, UpdateBoardRequest};
use crate::{
    auth::principal::Principal,
    error::ApiError,
    policy,
    store::{Board, BoardChanges, BoardId, Store, Task, TaskId, TaskStatus, UserId},
    users::dto::UserSummary,
};

pub async fn load_board(store: &dyn Store, id: BoardId) -> Result<Board, ApiError> {
    store
        .find_board(id)
        .await?
        .ok_or_else(|| ApiError::not_found("board not found"))
}

fn clean_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Board name must not be empty".into()));
    }
    Ok(name.to_string())
}

pub async fn list_boards(
    store: &dyn Store,
    principal: &Principal,
    name_filter: Option<&str>,
) -> Result<Vec<Board>, ApiError> {
    let filter = name_filter.map(str::trim).filter(|f| !f.is_empty());
    Ok(store.boards_for_member(principal.id(), filter).await?)
}

pub async fn create_board(
    store: &dyn Store,
    principal: &Principal,
    req: CreateBoardRequest,
) -> Result<Board, ApiError> {
    let name = clean_name(&req.name)?;
    let board = store
        .create_board(&name, req.description.as_deref(), principal.id())
        .await?;
    info!(board_id = %board.id, user_id = %principal.id(), "board created");
    Ok(board)
}

pub async fn get_board(
    store: &dyn Store,
    principal: &Principal,
    id: BoardId,
) -> Result<Board, ApiError> {
    let board = load_board(store, id).await?;
    policy::can_read_board(principal, &board).ensure()?;
    Ok(board)
}

pub async fn update_board(
    store: &dyn Store,
    principal: &Principal,
    id: BoardId,
    req: UpdateBoardRequest,
) -> Result<Board, ApiError> {
    let board = load_board(store, id).await?;
    policy::can_mutate_board(principal, &board).ensure()?;

    let changes = BoardChanges {
        name: req.name.as_deref().map(clean_name).transpose()?,
        description: req.description,
    };
    Ok(store.update_board(id, changes).await?)
}

pub async fn delete_board(
    store: &dyn Store,
    principal: &Principal,
    id: BoardId,
) -> Result<(), ApiError> {
    let board = load_board(store, id).await?;
    policy::can_mutate_board(principal, &board).ensure()?;
    store.delete_board(id).await?;
    info!(board_id = %id, "board deleted");
    Ok(())
}

pub async fn list_members(
    store: &dyn Store,
    principal: &Principal,
    id: BoardId,
) -> Result<Vec<UserSummary>, ApiError> {
    let board = load_board(store, id).await?;
    policy::can_read_board(principal, &board).ensure()?;

    let mut members = Vec::with_capacity(board.members.len());
    for member in &board.members {
        if let Some(user) = store.find_user(*member).await? {
            members.push(UserSummary::from(&user));
        }
    }
    Ok(members)
}

pub async fn add_member(
    store: &dyn Store,
    principal: &Principal,
    id: BoardId,
    user: UserId,
) -> Result<Board, ApiError> {
    let board = load_board(store, id).await?;
    policy::can_add_or_remove_member(principal, &board).ensure()?;
    let board = store.add_member(id, user).await?;
    info!(board_id = %id, member = %user, "member added");
    Ok(board)
}

pub async fn remove_member(
    store: &dyn Store,
    principal: &Principal,
    id: BoardId,
    user: UserId,
) -> Result<Board, ApiError> {
    let board = load_board(store, id).await?;
    policy::can_remove_member(principal, &board, user).ensure()?;
    let board = store.remove_member(id, user).await?;
    info!(board_id = %id, member = %user, "member removed");
    Ok(board)
}

pub async fn list_board_tasks(
    store: &dyn Store,
    principal: &Principal,
    id: BoardId,
    status: Option<TaskStatus>,
) -> Result<Vec<Task>, ApiError> {
    let board = load_board(store, id).await?;
    policy::can_read_board(principal, &board).ensure()?;
    Ok(store.tasks_for_board(id, status).await?)
}

/// The task must belong to the board named in the path.
pub async fn remove_board_task(
    store: &dyn Store,
    principal: &Principal,
    board_id: BoardId,
    task_id: TaskId,
) -> Result<(), ApiError> {
    let board = load_board(store, board_id).await?;
    let task = store
        .find_task(task_id)
        .await?
        .filter(|t| t.board_id == board_id)
        .ok_or_else(|| ApiError::not_found("task not found on this board"))?;
    policy::can_remove_task_from_board(principal, &board, &task).ensure()?;
    store.delete_task(task_id).await?;
    info!(board_id = %board_id, task_id = %task_id, "task removed from board");
    Ok(())
}
