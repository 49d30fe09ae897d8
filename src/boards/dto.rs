use serde::Deserialize;

use crate::store::TaskStatus;

#[derive(Debug, Default, Deserialize)]
pub struct BoardFilter {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBoardRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBoardRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Task creation scoped to a board taken from the path.
#[derive(Debug, Deserialize)]
pub struct CreateBoardTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}
