use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use super::repo_types::{BoardRow, TaskRow, UserRow};
use super::{
    Board, BoardChanges, BoardId, BoardStore, NewTask, NewUser, StoreError, StoreResult, Task,
    TaskChanges, TaskId, TaskStatus, TaskStore, UserChanges, UserId, UserRecord, UserStore,
};

const USER_COLUMNS: &str = "id, username, password_digest, role, created_at";

const TASK_COLUMNS: &str =
    "id, board_id, title, description, status, assigned_to, created_by, created_at, updated_at";

const BOARD_SELECT: &str = r#"
    SELECT b.id, b.name, b.description, b.created_by,
           COALESCE(array_agg(m.user_id) FILTER (WHERE m.user_id IS NOT NULL), '{}'::BIGINT[])
               AS members
    FROM boards b
    LEFT JOIN board_members m ON m.board_id = b.id
"#;

#[derive(Clone)]
pub struct PgStore {
    pub db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }

    async fn require_user(&self, id: UserId) -> StoreResult<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(id.0)
            .fetch_one(&self.db)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::NotFound("user"))
        }
    }

    async fn fetch_board(&self, id: BoardId) -> StoreResult<Board> {
        self.find_board(id)
            .await?
            .ok_or(StoreError::NotFound("board"))
    }
}

fn conflict_on_unique(e: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what()),
        _ => StoreError::Backend(e),
    }
}

/// Escapes `%`, `_` and the escape character itself so user input matches literally
/// under `LIKE ... ESCAPE '\'`.
fn like_literal(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn collect_tasks(rows: Vec<TaskRow>) -> StoreResult<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.db)
        .await?;
        row.map(UserRecord::try_from).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        row.map(UserRecord::try_from).transpose()
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<UserRecord> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, password_digest, role)
             VALUES ($1, $2, $3)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.username)
        .bind(&new.password_digest)
        .bind(new.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || format!("username '{}' already exists", new.username))
        })?;
        row.try_into()
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<UserRecord> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users
             SET username = COALESCE($2, username),
                 password_digest = COALESCE($3, password_digest)
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id.0)
        .bind(changes.username.as_deref())
        .bind(changes.password_digest.as_deref())
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!(
                    "username '{}' already exists",
                    changes.username.as_deref().unwrap_or_default()
                )
            })
        })?;
        row.ok_or(StoreError::NotFound("user"))?.try_into()
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<()> {
        // boards, memberships and task references go with the FK actions
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.0)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(UserRecord::try_from).collect()
    }

    async fn search_users(&self, prefix: &str, limit: usize) -> StoreResult<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE lower(username) LIKE lower($1) ESCAPE '\\'
             ORDER BY username
             LIMIT $2"
        ))
        .bind(format!("{}%", like_literal(prefix)))
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(UserRecord::try_from).collect()
    }
}

#[async_trait]
impl BoardStore for PgStore {
    async fn create_board(
        &self,
        name: &str,
        description: Option<&str>,
        created_by: UserId,
    ) -> StoreResult<Board> {
        self.require_user(created_by).await?;
        let mut tx = self.db.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO boards (name, description, created_by) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(name)
        .bind(description)
        .bind(created_by.0)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query("INSERT INTO board_members (board_id, user_id) VALUES ($1, $2)")
            .bind(id)
            .bind(created_by.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.fetch_board(BoardId(id)).await
    }

    async fn find_board(&self, id: BoardId) -> StoreResult<Option<Board>> {
        let row = sqlx::query_as::<_, BoardRow>(&format!(
            "{BOARD_SELECT} WHERE b.id = $1 GROUP BY b.id"
        ))
        .bind(id.0)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Board::from))
    }

    async fn boards_for_member(
        &self,
        user: UserId,
        name_filter: Option<&str>,
    ) -> StoreResult<Vec<Board>> {
        let rows = sqlx::query_as::<_, BoardRow>(&format!(
            "{BOARD_SELECT}
             WHERE (b.created_by = $1
                    OR EXISTS (SELECT 1 FROM board_members x
                               WHERE x.board_id = b.id AND x.user_id = $1))
               AND ($2::TEXT IS NULL OR b.name ILIKE $2 ESCAPE '\\')
             GROUP BY b.id
             ORDER BY b.id"
        ))
        .bind(user.0)
        .bind(name_filter.map(|name| format!("%{}%", like_literal(name))))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Board::from).collect())
    }

    async fn update_board(&self, id: BoardId, changes: BoardChanges) -> StoreResult<Board> {
        let res = sqlx::query(
            "UPDATE boards
             SET name = COALESCE($2, name), description = COALESCE($3, description)
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(changes.name.as_deref())
        .bind(changes.description.as_deref())
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("board"));
        }
        self.fetch_board(id).await
    }

    async fn delete_board(&self, id: BoardId) -> StoreResult<()> {
        let res = sqlx::query("DELETE FROM boards WHERE id = $1")
            .bind(id.0)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("board"));
        }
        Ok(())
    }

    async fn add_member(&self, board: BoardId, user: UserId) -> StoreResult<Board> {
        self.fetch_board(board).await?;
        self.require_user(user).await?;
        sqlx::query(
            "INSERT INTO board_members (board_id, user_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(board.0)
        .bind(user.0)
        .execute(&self.db)
        .await?;
        self.fetch_board(board).await
    }

    async fn remove_member(&self, board: BoardId, user: UserId) -> StoreResult<Board> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM board_members WHERE board_id = $1 AND user_id = $2")
            .bind(board.0)
            .bind(user.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE tasks SET assigned_to = NULL, updated_at = now()
             WHERE board_id = $1 AND assigned_to = $2",
        )
        .bind(board.0)
        .bind(user.0)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        self.fetch_board(board).await
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn create_task(&self, new: NewTask) -> StoreResult<Task> {
        self.fetch_board(new.board_id).await?;
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "INSERT INTO tasks (board_id, title, description, status, created_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(new.board_id.0)
        .bind(&new.title)
        .bind(new.description.as_deref())
        .bind(new.status.as_str())
        .bind(new.created_by.0)
        .fetch_one(&self.db)
        .await?;
        row.try_into()
    }

    async fn find_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.db)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn update_task(&self, id: TaskId, changes: TaskChanges) -> StoreResult<Task> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE tasks
             SET title = COALESCE($2, title),
                 description = COALESCE($3, description),
                 status = COALESCE($4, status),
                 updated_at = now()
             WHERE id = $1
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id.0)
        .bind(changes.title.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.status.map(|s| s.as_str()))
        .fetch_optional(&self.db)
        .await?;
        row.ok_or(StoreError::NotFound("task"))?.try_into()
    }

    async fn set_assignee(&self, id: TaskId, assignee: Option<UserId>) -> StoreResult<Task> {
        if let Some(user) = assignee {
            self.require_user(user).await?;
        }
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE tasks SET assigned_to = $2, updated_at = now()
             WHERE id = $1
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id.0)
        .bind(assignee.map(|u| u.0))
        .fetch_optional(&self.db)
        .await?;
        row.ok_or(StoreError::NotFound("task"))?.try_into()
    }

    async fn delete_task(&self, id: TaskId) -> StoreResult<()> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id.0)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("task"));
        }
        Ok(())
    }

    async fn tasks_for_board(
        &self,
        board: BoardId,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE board_id = $1 AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY id"
        ))
        .bind(board.0)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;
        collect_tasks(rows)
    }

    async fn tasks_assigned_to(&self, user: UserId) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE assigned_to = $1 ORDER BY id"
        ))
        .bind(user.0)
        .fetch_all(&self.db)
        .await?;
        collect_tasks(rows)
    }
}
