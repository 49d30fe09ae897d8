//! Persistence for users, boards and tasks.
//!
//! Relationships are plain id references: a board stores its creator id and a
//! set of member ids, a task stores the id of its board. Nothing holds a pointer
//! back into another record, so every lookup goes through a table.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

pub mod memory;
pub mod postgres;
mod repo_types;

pub use memory::MemoryStore;
pub use postgres::PgStore;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(UserId);
id_type!(BoardId);
id_type!(TaskId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Persisted identity record.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_digest: String, // Argon2 PHC string, never exposed
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_digest: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub password_digest: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    pub description: Option<String>,
    pub created_by: UserId,
    pub members: BTreeSet<UserId>,
}

impl Board {
    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoardChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Future,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Future => "FUTURE",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FUTURE" => Some(TaskStatus::Future),
            "IN_PROGRESS" => Some(TaskStatus::InProgress),
            "DONE" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub board_id: BoardId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub assigned_to: Option<UserId>,
    pub created_by: Option<UserId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub board_id: BoardId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_by: UserId,
}

#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<UserRecord>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>>;
    /// Fails with `Conflict` when the username is taken.
    async fn create_user(&self, new: NewUser) -> StoreResult<UserRecord>;
    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<UserRecord>;
    /// Removes the account, the boards it created and every reference to it.
    async fn delete_user(&self, id: UserId) -> StoreResult<()>;
    async fn list_users(&self) -> StoreResult<Vec<UserRecord>>;
    async fn search_users(&self, prefix: &str, limit: usize) -> StoreResult<Vec<UserRecord>>;
}

#[async_trait]
pub trait BoardStore: Send + Sync {
    /// The creator becomes the first member.
    async fn create_board(
        &self,
        name: &str,
        description: Option<&str>,
        created_by: UserId,
    ) -> StoreResult<Board>;
    async fn find_board(&self, id: BoardId) -> StoreResult<Option<Board>>;
    /// Boards the user created or is a member of, optionally filtered by name.
    async fn boards_for_member(
        &self,
        user: UserId,
        name_filter: Option<&str>,
    ) -> StoreResult<Vec<Board>>;
    async fn update_board(&self, id: BoardId, changes: BoardChanges) -> StoreResult<Board>;
    async fn delete_board(&self, id: BoardId) -> StoreResult<()>;
    async fn add_member(&self, board: BoardId, user: UserId) -> StoreResult<Board>;
    async fn remove_member(&self, board: BoardId, user: UserId) -> StoreResult<Board>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, new: NewTask) -> StoreResult<Task>;
    async fn find_task(&self, id: TaskId) -> StoreResult<Option<Task>>;
    async fn update_task(&self, id: TaskId, changes: TaskChanges) -> StoreResult<Task>;
    async fn set_assignee(&self, id: TaskId, assignee: Option<UserId>) -> StoreResult<Task>;
    async fn delete_task(&self, id: TaskId) -> StoreResult<()>;
    async fn tasks_for_board(
        &self,
        board: BoardId,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>>;
    async fn tasks_assigned_to(&self, user: UserId) -> StoreResult<Vec<Task>>;
}

pub trait Store: UserStore + BoardStore + TaskStore {}

impl<T: UserStore + BoardStore + TaskStore> Store for T {}
