//! Task operations. Every rule is decided on the task's parent board.

use std::collections::HashMap;

use tracing::info;

use super::dto::UpdateTaskRequest;
use crate::{
    auth::principal::Principal,
    boards::services::load_board,
    error::ApiError,
    policy,
    store::{Board, BoardId, NewTask, Store, Task, TaskChanges, TaskId, TaskStatus, UserId},
    users::{dto::UserSummary, services::load_user},
};

fn clean_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Task title must not be empty".into()));
    }
    Ok(title.to_string())
}

async fn load_task_with_board(store: &dyn Store, id: TaskId) -> Result<(Task, Board), ApiError> {
    let task = store
        .find_task(id)
        .await?
        .ok_or_else(|| ApiError::not_found("task not found"))?;
    let board = load_board(store, task.board_id).await?;
    Ok((task, board))
}

pub async fn create_task(
    store: &dyn Store,
    principal: &Principal,
    board_id: BoardId,
    title: String,
    description: Option<String>,
    status: Option<TaskStatus>,
) -> Result<Task, ApiError> {
    let board = load_board(store, board_id).await?;
    policy::can_create_task_on_board(principal, &board).ensure()?;

    let task = store
        .create_task(NewTask {
            board_id,
            title: clean_title(&title)?,
            description,
            status: status.unwrap_or(TaskStatus::Future),
            created_by: principal.id(),
        })
        .await?;
    info!(task_id = %task.id, board_id = %board_id, user_id = %principal.id(), "task created");
    Ok(task)
}

pub async fn get_task(store: &dyn Store, principal: &Principal, id: TaskId) -> Result<Task, ApiError> {
    let (task, board) = load_task_with_board(store, id).await?;
    policy::can_read_task(principal, &board).ensure()?;
    Ok(task)
}

pub async fn update_task(
    store: &dyn Store,
    principal: &Principal,
    id: TaskId,
    req: UpdateTaskRequest,
) -> Result<Task, ApiError> {
    let (_, board) = load_task_with_board(store, id).await?;
    policy::can_update_task(principal, &board).ensure()?;

    let changes = TaskChanges {
        title: req.title.as_deref().map(clean_title).transpose()?,
        description: req.description,
        status: req.status,
    };
    Ok(store.update_task(id, changes).await?)
}

pub async fn delete_task(store: &dyn Store, principal: &Principal, id: TaskId) -> Result<(), ApiError> {
    let (task, board) = load_task_with_board(store, id).await?;
    policy::can_delete_task(principal, &board, &task).ensure()?;
    store.delete_task(id).await?;
    info!(task_id = %id, "task deleted");
    Ok(())
}

pub async fn assign_task(
    store: &dyn Store,
    principal: &Principal,
    id: TaskId,
    assignee: UserId,
) -> Result<Task, ApiError> {
    let (_, board) = load_task_with_board(store, id).await?;
    policy::can_update_task(principal, &board).ensure()?;
    load_user(store, assignee).await?;
    policy::can_assign_task(principal, &board, assignee).ensure()?;

    let task = store.set_assignee(id, Some(assignee)).await?;
    info!(task_id = %id, assignee = %assignee, "task assigned");
    Ok(task)
}

pub async fn unassign_task(store: &dyn Store, principal: &Principal, id: TaskId) -> Result<Task, ApiError> {
    let (_, board) = load_task_with_board(store, id).await?;
    policy::can_update_task(principal, &board).ensure()?;
    Ok(store.set_assignee(id, None).await?)
}

pub async fn task_assignee(
    store: &dyn Store,
    principal: &Principal,
    id: TaskId,
) -> Result<UserSummary, ApiError> {
    let (task, board) = load_task_with_board(store, id).await?;
    policy::can_read_task(principal, &board).ensure()?;
    let assignee = task
        .assigned_to
        .ok_or_else(|| ApiError::not_found("task has no assignee"))?;
    let user = load_user(store, assignee).await?;
    Ok(UserSummary::from(&user))
}

/// Tasks assigned to `user`, limited to boards the caller can read.
pub async fn tasks_for_user(
    store: &dyn Store,
    principal: &Principal,
    user: UserId,
) -> Result<Vec<Task>, ApiError> {
    load_user(store, user).await?;
    let assigned = store.tasks_assigned_to(user).await?;

    let mut readable: HashMap<BoardId, bool> = HashMap::new();
    let mut visible = Vec::with_capacity(assigned.len());
    for task in assigned {
        let allowed = match readable.get(&task.board_id) {
            Some(allowed) => *allowed,
            None => {
                let allowed = match store.find_board(task.board_id).await? {
                    Some(board) => policy::can_read_board(principal, &board).is_allowed(),
                    None => false,
                };
                readable.insert(task.board_id, allowed);
                allowed
            }
        };
        if allowed {
            visible.push(task);
        }
    }
    Ok(visible)
}
