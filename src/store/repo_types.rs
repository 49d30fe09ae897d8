use std::collections::BTreeSet;

use sqlx::FromRow;
use time::OffsetDateTime;

use super::{Board, BoardId, Role, StoreError, Task, TaskId, TaskStatus, UserId, UserRecord};

/// `users` row as stored; `role` is kept as text.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_digest: String,
    pub role: String,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&r.role)
            .ok_or_else(|| StoreError::Corrupt(format!("user {} has role '{}'", r.id, r.role)))?;
        Ok(Self {
            id: UserId(r.id),
            username: r.username,
            password_digest: r.password_digest,
            role,
            created_at: r.created_at,
        })
    }
}

/// `boards` row joined with its aggregated member ids.
#[derive(Debug, FromRow)]
pub struct BoardRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: i64,
    pub members: Vec<i64>,
}

impl From<BoardRow> for Board {
    fn from(r: BoardRow) -> Self {
        Self {
            id: BoardId(r.id),
            name: r.name,
            description: r.description,
            created_by: UserId(r.created_by),
            members: r.members.into_iter().map(UserId).collect::<BTreeSet<_>>(),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub board_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub assigned_to: Option<i64>,
    pub created_by: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(r: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::parse(&r.status).ok_or_else(|| {
            StoreError::Corrupt(format!("task {} has status '{}'", r.id, r.status))
        })?;
        Ok(Self {
            id: TaskId(r.id),
            board_id: BoardId(r.board_id),
            title: r.title,
            description: r.description,
            status,
            assigned_to: r.assigned_to.map(UserId),
            created_by: r.created_by.map(UserId),
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}
