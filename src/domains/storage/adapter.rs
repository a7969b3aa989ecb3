use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::domains::storage::repository::{NoteRepository, SettingRepository, TodoRepository};
use crate::domains::storage::types::{Note, Todo};
use crate::domains::sync::hash;
use crate::errors::DomainResult;

/// Typed view over local Notes/Todos/Settings keyed by `sync_id`, sitting
/// between the sync core and the local repository. Every write this
/// adapter performs on behalf of the sync core bypasses the change
/// journal: callers always pass `skip_change_log=true`.
pub struct StorageAdapter {
    notes: Arc<dyn NoteRepository>,
    todos: Arc<dyn TodoRepository>,
    settings: Arc<dyn SettingRepository>,
}

impl StorageAdapter {
    pub fn new(notes: Arc<dyn NoteRepository>, todos: Arc<dyn TodoRepository>, settings: Arc<dyn SettingRepository>) -> Self {
        Self { notes, todos, settings }
    }

    pub async fn get_all_notes(&self, include_deleted: bool) -> DomainResult<HashMap<Uuid, Note>> {
        let notes = self.notes.find_all(include_deleted).await?;
        Ok(notes.into_iter().map(|n| (n.sync_id, n)).collect())
    }

    pub async fn get_note(&self, sync_id: Uuid, include_deleted: bool) -> DomainResult<Option<Note>> {
        self.notes.find_by_sync_id(sync_id, include_deleted).await
    }

    pub async fn get_all_todos(&self, include_deleted: bool) -> DomainResult<HashMap<Uuid, Todo>> {
        let todos = self.todos.find_all(include_deleted).await?;
        Ok(todos.into_iter().map(|t| (t.sync_id, t)).collect())
    }

    pub async fn get_todo(&self, sync_id: Uuid, include_deleted: bool) -> DomainResult<Option<Todo>> {
        self.todos.find_by_sync_id(sync_id, include_deleted).await
    }

    /// `{key: decoded_value}`, decoded per the row's declared type.
    pub async fn get_all_settings(&self) -> DomainResult<HashMap<String, Value>> {
        let pairs = self.settings.get_all().await?;
        Ok(pairs.into_iter().collect())
    }

    /// Upserts by `sync_id`: updates if present, otherwise creates with
    /// the provided `sync_id`.
    pub async fn upsert_note(&self, note: &Note, skip_change_log: bool) -> DomainResult<()> {
        self.notes.upsert(note, skip_change_log).await
    }

    /// If the incoming record is marked deleted and the local copy
    /// exists, this performs a soft-delete; if deleted-remote and
    /// absent-local, it is a no-op.
    pub async fn upsert_todo(&self, todo: &Todo, skip_change_log: bool) -> DomainResult<()> {
        if todo.is_deleted {
            let local = self.todos.find_by_sync_id(todo.sync_id, true).await?;
            match local {
                Some(_) => self.todos.soft_delete(todo.sync_id, skip_change_log).await,
                None => Ok(()),
            }
        } else {
            self.todos.upsert(todo, skip_change_log).await
        }
    }

    pub async fn soft_delete_note(&self, sync_id: Uuid, skip_change_log: bool) -> DomainResult<()> {
        self.notes.soft_delete(sync_id, skip_change_log).await
    }

    pub async fn soft_delete_todo(&self, sync_id: Uuid, skip_change_log: bool) -> DomainResult<()> {
        self.todos.soft_delete(sync_id, skip_change_log).await
    }

    /// Transactional upsert by key, serialized by declared type.
    pub async fn update_settings(&self, values: &HashMap<String, Value>) -> DomainResult<()> {
        let pairs: Vec<(String, Value)> = values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self.settings.update_many(&pairs).await
    }

    pub fn note_hash(&self, note: &Note) -> String {
        match note.kind {
            crate::domains::storage::types::NoteKind::Markdown => hash::markdown_hash(&note.body),
            crate::domains::storage::types::NoteKind::Whiteboard => {
                let value: Value = serde_json::from_str(&note.body).unwrap_or(Value::Null);
                hash::json_hash(&value, &[])
            }
        }
    }

    pub fn todos_hash(&self, todos: &[Todo]) -> String {
        let values: Vec<Value> = todos.iter().map(todo_to_value).collect();
        hash::todos_hash(&values)
    }

    pub fn settings_hash(&self, settings: &HashMap<String, Value>) -> String {
        let value = json!(settings);
        hash::settings_hash(&value)
    }
}

fn todo_to_value(todo: &Todo) -> Value {
    json!({
        "id": todo.sync_id.to_string(),
        "content": todo.content,
        "is_completed": todo.is_completed,
        "is_deleted": todo.is_deleted,
        "updated_at": todo.updated_at.timestamp_millis(),
    })
}

/// Converts an RFC3339 timestamp (or `None`) to milliseconds since the
/// epoch, per the normalization rules StorageAdapter consumers expect.
pub fn to_epoch_ms(dt: Option<chrono::DateTime<chrono::Utc>>) -> Option<i64> {
    dt.map(|dt| dt.timestamp_millis())
}
