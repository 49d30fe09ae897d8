use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{
    Board, BoardChanges, BoardId, BoardStore, NewTask, NewUser, StoreError, StoreResult, Task,
    TaskChanges, TaskId, TaskStatus, TaskStore, UserChanges, UserId, UserRecord, UserStore,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, UserRecord>,
    boards: BTreeMap<BoardId, Board>,
    tasks: BTreeMap<TaskId, Task>,
    next_user: i64,
    next_board: i64,
    next_task: i64,
}

impl Tables {
    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }
}

/// In-process store used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<UserRecord> {
        let mut t = self.tables.write().await;
        if t.username_taken(&new.username, None) {
            return Err(StoreError::Conflict(format!(
                "username '{}' already exists",
                new.username
            )));
        }
        t.next_user += 1;
        let user = UserRecord {
            id: UserId(t.next_user),
            username: new.username,
            password_digest: new.password_digest,
            role: new.role,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<UserRecord> {
        let mut t = self.tables.write().await;
        if let Some(name) = changes.username.as_deref() {
            if t.username_taken(name, Some(id)) {
                return Err(StoreError::Conflict(format!("username '{name}' already exists")));
            }
        }
        let user = t.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
        if let Some(name) = changes.username {
            user.username = name;
        }
        if let Some(digest) = changes.password_digest {
            user.password_digest = digest;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.users.remove(&id).is_none() {
            return Err(StoreError::NotFound("user"));
        }

        let owned: BTreeSet<BoardId> = t
            .boards
            .values()
            .filter(|b| b.created_by == id)
            .map(|b| b.id)
            .collect();
        t.boards.retain(|bid, _| !owned.contains(bid));
        t.tasks.retain(|_, task| !owned.contains(&task.board_id));

        for board in t.boards.values_mut() {
            board.members.remove(&id);
        }
        for task in t.tasks.values_mut() {
            if task.assigned_to == Some(id) {
                task.assigned_to = None;
            }
            if task.created_by == Some(id) {
                task.created_by = None;
            }
        }
        Ok(())
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn search_users(&self, prefix: &str, limit: usize) -> StoreResult<Vec<UserRecord>> {
        let prefix = prefix.to_lowercase();
        let t = self.tables.read().await;
        let mut found: Vec<UserRecord> = t
            .users
            .values()
            .filter(|u| u.username.to_lowercase().starts_with(&prefix))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.username.cmp(&b.username));
        found.truncate(limit);
        Ok(found)
    }
}

#[async_trait]
impl BoardStore for MemoryStore {
    async fn create_board(
        &self,
        name: &str,
        description: Option<&str>,
        created_by: UserId,
    ) -> StoreResult<Board> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&created_by) {
            return Err(StoreError::NotFound("user"));
        }
        t.next_board += 1;
        let board = Board {
            id: BoardId(t.next_board),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_by,
            members: BTreeSet::from([created_by]),
        };
        t.boards.insert(board.id, board.clone());
        Ok(board)
    }

    async fn find_board(&self, id: BoardId) -> StoreResult<Option<Board>> {
        Ok(self.tables.read().await.boards.get(&id).cloned())
    }

    async fn boards_for_member(
        &self,
        user: UserId,
        name_filter: Option<&str>,
    ) -> StoreResult<Vec<Board>> {
        let needle = name_filter.map(str::to_lowercase);
        let t = self.tables.read().await;
        Ok(t.boards
            .values()
            .filter(|b| b.created_by == user || b.is_member(user))
            .filter(|b| match &needle {
                Some(n) => b.name.to_lowercase().contains(n),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn update_board(&self, id: BoardId, changes: BoardChanges) -> StoreResult<Board> {
        let mut t = self.tables.write().await;
        let board = t.boards.get_mut(&id).ok_or(StoreError::NotFound("board"))?;
        if let Some(name) = changes.name {
            board.name = name;
        }
        if let Some(description) = changes.description {
            board.description = Some(description);
        }
        Ok(board.clone())
    }

    async fn delete_board(&self, id: BoardId) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.boards.remove(&id).is_none() {
            return Err(StoreError::NotFound("board"));
        }
        t.tasks.retain(|_, task| task.board_id != id);
        Ok(())
    }

    async fn add_member(&self, board: BoardId, user: UserId) -> StoreResult<Board> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&user) {
            return Err(StoreError::NotFound("user"));
        }
        let board = t.boards.get_mut(&board).ok_or(StoreError::NotFound("board"))?;
        board.members.insert(user);
        Ok(board.clone())
    }

    async fn remove_member(&self, board: BoardId, user: UserId) -> StoreResult<Board> {
        let mut t = self.tables.write().await;
        let removed = t.boards.get_mut(&board).ok_or(StoreError::NotFound("board"))?;
        removed.members.remove(&user);
        let removed = removed.clone();

        let now = OffsetDateTime::now_utc();
        for task in t.tasks.values_mut() {
            if task.board_id == board && task.assigned_to == Some(user) {
                task.assigned_to = None;
                task.updated_at = now;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, new: NewTask) -> StoreResult<Task> {
        let mut t = self.tables.write().await;
        if !t.boards.contains_key(&new.board_id) {
            return Err(StoreError::NotFound("board"));
        }
        t.next_task += 1;
        let now = OffsetDateTime::now_utc();
        let task = Task {
            id: TaskId(t.next_task),
            board_id: new.board_id,
            title: new.title,
            description: new.description,
            status: new.status,
            assigned_to: None,
            created_by: Some(new.created_by),
            created_at: now,
            updated_at: now,
        };
        t.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.tables.read().await.tasks.get(&id).cloned())
    }

    async fn update_task(&self, id: TaskId, changes: TaskChanges) -> StoreResult<Task> {
        let mut t = self.tables.write().await;
        let task = t.tasks.get_mut(&id).ok_or(StoreError::NotFound("task"))?;
        if let Some(title) = changes.title {
            task.title = title;
        }
        if let Some(description) = changes.description {
            task.description = Some(description);
        }
        if let Some(status) = changes.status {
            task.status = status;
        }
        task.updated_at = OffsetDateTime::now_utc();
        Ok(task.clone())
    }

    async fn set_assignee(&self, id: TaskId, assignee: Option<UserId>) -> StoreResult<Task> {
        let mut t = self.tables.write().await;
        if let Some(user) = assignee {
            if !t.users.contains_key(&user) {
                return Err(StoreError::NotFound("user"));
            }
        }
        let task = t.tasks.get_mut(&id).ok_or(StoreError::NotFound("task"))?;
        task.assigned_to = assignee;
        task.updated_at = OffsetDateTime::now_utc();
        Ok(task.clone())
    }

    async fn delete_task(&self, id: TaskId) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.tasks
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("task"))
    }

    async fn tasks_for_board(
        &self,
        board: BoardId,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>> {
        let t = self.tables.read().await;
        Ok(t.tasks
            .values()
            .filter(|task| task.board_id == board)
            .filter(|task| status.map_or(true, |s| task.status == s))
            .cloned()
            .collect())
    }

    async fn tasks_assigned_to(&self, user: UserId) -> StoreResult<Vec<Task>> {
        let t = self.tables.read().await;
        Ok(t.tasks
            .values()
            .filter(|task| task.assigned_to == Some(user))
            .cloned()
            .collect())
    }
}
