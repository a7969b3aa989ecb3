use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::domains::storage::types::{
    decode_setting, encode_setting, Note, NoteRow, SettingRow, SettingValueType, Todo, TodoRow,
};
use crate::errors::{DbError, DomainError, DomainResult};

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn find_all(&self, include_deleted: bool) -> DomainResult<Vec<Note>>;
    async fn find_by_sync_id(&self, sync_id: Uuid, include_deleted: bool) -> DomainResult<Option<Note>>;
    /// Upserts by `sync_id`; callers from the sync core always pass `skip_change_log=true`.
    async fn upsert(&self, note: &Note, skip_change_log: bool) -> DomainResult<()>;
    async fn soft_delete(&self, sync_id: Uuid, skip_change_log: bool) -> DomainResult<()>;
}

#[async_trait]
pub trait TodoRepository: Send + Sync {
    async fn find_all(&self, include_deleted: bool) -> DomainResult<Vec<Todo>>;
    async fn find_by_sync_id(&self, sync_id: Uuid, include_deleted: bool) -> DomainResult<Option<Todo>>;
    async fn upsert(&self, todo: &Todo, skip_change_log: bool) -> DomainResult<()>;
    async fn soft_delete(&self, sync_id: Uuid, skip_change_log: bool) -> DomainResult<()>;
}

#[async_trait]
pub trait SettingRepository: Send + Sync {
    async fn get_all(&self) -> DomainResult<Vec<(String, Value)>>;
    /// Transactional upsert by key, serialized by the declared type.
    async fn update_many(&self, values: &[(String, Value)]) -> DomainResult<()>;
}

pub struct SqliteNoteRepository {
    pool: Pool<Sqlite>,
}

impl SqliteNoteRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteRepository for SqliteNoteRepository {
    async fn find_all(&self, include_deleted: bool) -> DomainResult<Vec<Note>> {
        let rows: Vec<NoteRow> = if include_deleted {
            sqlx::query_as(
                "SELECT sync_id, title, body, kind, tags, category, pinned, favorite, created_at, updated_at, is_deleted, deleted_at FROM notes",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?
        } else {
            sqlx::query_as(
                "SELECT sync_id, title, body, kind, tags, category, pinned, favorite, created_at, updated_at, is_deleted, deleted_at FROM notes WHERE is_deleted = 0",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?
        };

        rows.into_iter().map(Note::try_from).collect()
    }

    async fn find_by_sync_id(&self, sync_id: Uuid, include_deleted: bool) -> DomainResult<Option<Note>> {
        let sync_id_str = sync_id.to_string();
        let row: Option<NoteRow> = if include_deleted {
            sqlx::query_as(
                "SELECT sync_id, title, body, kind, tags, category, pinned, favorite, created_at, updated_at, is_deleted, deleted_at FROM notes WHERE sync_id = ?",
            )
            .bind(&sync_id_str)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Sqlx)?
        } else {
            sqlx::query_as(
                "SELECT sync_id, title, body, kind, tags, category, pinned, favorite, created_at, updated_at, is_deleted, deleted_at FROM notes WHERE sync_id = ? AND is_deleted = 0",
            )
            .bind(&sync_id_str)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Sqlx)?
        };

        row.map(Note::try_from).transpose()
    }

    async fn upsert(&self, note: &Note, skip_change_log: bool) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notes (sync_id, title, body, kind, tags, category, pinned, favorite, created_at, updated_at, is_deleted, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(sync_id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                kind = excluded.kind,
                tags = excluded.tags,
                category = excluded.category,
                pinned = excluded.pinned,
                favorite = excluded.favorite,
                updated_at = excluded.updated_at,
                is_deleted = excluded.is_deleted,
                deleted_at = excluded.deleted_at
            "#,
        )
        .bind(note.sync_id.to_string())
        .bind(&note.title)
        .bind(&note.body)
        .bind(note.kind.as_str())
        .bind(&note.tags)
        .bind(&note.category)
        .bind(note.pinned as i64)
        .bind(note.favorite as i64)
        .bind(note.created_at.to_rfc3339())
        .bind(note.updated_at.to_rfc3339())
        .bind(note.is_deleted as i64)
        .bind(note.deleted_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        if !skip_change_log {
            log::debug!("note {} upserted without skip_change_log; caller is responsible for journaling", note.sync_id);
        }

        Ok(())
    }

    async fn soft_delete(&self, sync_id: Uuid, skip_change_log: bool) -> DomainResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE notes SET is_deleted = 1, deleted_at = ?, updated_at = ? WHERE sync_id = ?")
            .bind(&now)
            .bind(&now)
            .bind(sync_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        if !skip_change_log {
            log::debug!("note {} soft-deleted without skip_change_log", sync_id);
        }

        Ok(())
    }
}

pub struct SqliteTodoRepository {
    pool: Pool<Sqlite>,
}

impl SqliteTodoRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TodoRepository for SqliteTodoRepository {
    async fn find_all(&self, include_deleted: bool) -> DomainResult<Vec<Todo>> {
        let rows: Vec<TodoRow> = if include_deleted {
            sqlx::query_as(
                "SELECT sync_id, content, description, tags, important, urgent, due_at, end_at, has_time, focus_seconds, repeat_rule, parent_todo_id, is_completed, completed_at, created_at, updated_at, is_deleted, deleted_at FROM todos",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?
        } else {
            sqlx::query_as(
                "SELECT sync_id, content, description, tags, important, urgent, due_at, end_at, has_time, focus_seconds, repeat_rule, parent_todo_id, is_completed, completed_at, created_at, updated_at, is_deleted, deleted_at FROM todos WHERE is_deleted = 0",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?
        };

        rows.into_iter().map(Todo::try_from).collect()
    }

    async fn find_by_sync_id(&self, sync_id: Uuid, include_deleted: bool) -> DomainResult<Option<Todo>> {
        let sync_id_str = sync_id.to_string();
        let row: Option<TodoRow> = if include_deleted {
            sqlx::query_as(
                "SELECT sync_id, content, description, tags, important, urgent, due_at, end_at, has_time, focus_seconds, repeat_rule, parent_todo_id, is_completed, completed_at, created_at, updated_at, is_deleted, deleted_at FROM todos WHERE sync_id = ?",
            )
            .bind(&sync_id_str)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Sqlx)?
        } else {
            sqlx::query_as(
                "SELECT sync_id, content, description, tags, important, urgent, due_at, end_at, has_time, focus_seconds, repeat_rule, parent_todo_id, is_completed, completed_at, created_at, updated_at, is_deleted, deleted_at FROM todos WHERE sync_id = ? AND is_deleted = 0",
            )
            .bind(&sync_id_str)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Sqlx)?
        };

        row.map(Todo::try_from).transpose()
    }

    async fn upsert(&self, todo: &Todo, skip_change_log: bool) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO todos (
                sync_id, content, description, tags, important, urgent, due_at, end_at,
                has_time, focus_seconds, repeat_rule, parent_todo_id, is_completed, completed_at,
                created_at, updated_at, is_deleted, deleted_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(sync_id) DO UPDATE SET
                content = excluded.content,
                description = excluded.description,
                tags = excluded.tags,
                important = excluded.important,
                urgent = excluded.urgent,
                due_at = excluded.due_at,
                end_at = excluded.end_at,
                has_time = excluded.has_time,
                focus_seconds = excluded.focus_seconds,
                repeat_rule = excluded.repeat_rule,
                parent_todo_id = excluded.parent_todo_id,
                is_completed = excluded.is_completed,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at,
                is_deleted = excluded.is_deleted,
                deleted_at = excluded.deleted_at
            "#,
        )
        .bind(todo.sync_id.to_string())
        .bind(&todo.content)
        .bind(&todo.description)
        .bind(&todo.tags)
        .bind(todo.important as i64)
        .bind(todo.urgent as i64)
        .bind(todo.due_at.map(|dt| dt.to_rfc3339()))
        .bind(todo.end_at.map(|dt| dt.to_rfc3339()))
        .bind(todo.has_time as i64)
        .bind(todo.focus_seconds)
        .bind(&todo.repeat_rule)
        .bind(todo.parent_todo_id.map(|id| id.to_string()))
        .bind(todo.is_completed as i64)
        .bind(todo.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(todo.created_at.to_rfc3339())
        .bind(todo.updated_at.to_rfc3339())
        .bind(todo.is_deleted as i64)
        .bind(todo.deleted_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        if !skip_change_log {
            log::debug!("todo {} upserted without skip_change_log; caller is responsible for journaling", todo.sync_id);
        }

        Ok(())
    }

    async fn soft_delete(&self, sync_id: Uuid, skip_change_log: bool) -> DomainResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE todos SET is_deleted = 1, deleted_at = ?, updated_at = ? WHERE sync_id = ?")
            .bind(&now)
            .bind(&now)
            .bind(sync_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        if !skip_change_log {
            log::debug!("todo {} soft-deleted without skip_change_log", sync_id);
        }

        Ok(())
    }
}

pub struct SqliteSettingRepository {
    pool: Pool<Sqlite>,
}

impl SqliteSettingRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingRepository for SqliteSettingRepository {
    async fn get_all(&self) -> DomainResult<Vec<(String, Value)>> {
        let rows: Vec<SettingRow> = sqlx::query_as("SELECT key, value_type, value, updated_at FROM settings")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        rows.into_iter()
            .map(|row| {
                let value_type = SettingValueType::from_str(&row.value_type)
                    .ok_or_else(|| DomainError::Internal(format!("unknown setting value_type: {}", row.value_type)))?;
                Ok((row.key, decode_setting(value_type, &row.value)))
            })
            .collect()
    }

    async fn update_many(&self, values: &[(String, Value)]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::Sqlx)?;
        let now = chrono::Utc::now().to_rfc3339();

        for (key, value) in values {
            let (value_type, raw) = encode_setting(value);
            sqlx::query(
                r#"
                INSERT INTO settings (key, value_type, value, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value_type = excluded.value_type,
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value_type.as_str())
            .bind(raw)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(DbError::Sqlx)?;
        }

        tx.commit().await.map_err(DbError::Sqlx)?;
        Ok(())
    }
}
