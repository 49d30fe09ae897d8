use serde::Deserialize;

use crate::store::{BoardId, TaskStatus};

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub board_id: BoardId,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}
