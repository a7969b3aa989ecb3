//! Exercises `StorageAdapter` end-to-end against a real SQLite database,
//! the way a consumer of this crate would: no access to private modules,
//! only the public `domains::storage` surface.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use flashnote_sync_core::domains::storage::{
    Note, NoteKind, SqliteNoteRepository, SqliteSettingRepository, SqliteTodoRepository, StorageAdapter, Todo,
};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

const INIT_SQL: &str = include_str!("../migrations/20240101000000_init.sql");

async fn test_adapter() -> StorageAdapter {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_lazy("sqlite::memory:")
        .expect("pool opens");
    sqlx::raw_sql(INIT_SQL).execute(&pool).await.expect("schema applies");

    let notes = Arc::new(SqliteNoteRepository::new(pool.clone()));
    let todos = Arc::new(SqliteTodoRepository::new(pool.clone()));
    let settings = Arc::new(SqliteSettingRepository::new(pool.clone()));
    StorageAdapter::new(notes, todos, settings)
}

fn sample_note() -> Note {
    let now = Utc::now();
    Note {
        sync_id: Uuid::new_v4(),
        title: "Groceries".to_string(),
        body: "- milk\n- eggs\n".to_string(),
        kind: NoteKind::Markdown,
        tags: "home".to_string(),
        category: String::new(),
        pinned: false,
        favorite: false,
        created_at: now,
        updated_at: now,
        is_deleted: false,
        deleted_at: None,
    }
}

fn sample_todo() -> Todo {
    let now = Utc::now();
    Todo {
        sync_id: Uuid::new_v4(),
        content: "Call the vet".to_string(),
        description: String::new(),
        tags: String::new(),
        important: true,
        urgent: false,
        due_at: None,
        end_at: None,
        has_time: false,
        focus_seconds: 0,
        repeat_rule: None,
        parent_todo_id: None,
        is_completed: false,
        completed_at: None,
        created_at: now,
        updated_at: now,
        is_deleted: false,
        deleted_at: None,
    }
}

#[tokio::test]
async fn upsert_then_get_round_trips_a_note() {
    let adapter = test_adapter().await;
    let note = sample_note();

    adapter.upsert_note(&note, true).await.unwrap();
    let fetched = adapter.get_note(note.sync_id, true).await.unwrap().unwrap();

    assert_eq!(fetched.title, "Groceries");
    assert_eq!(fetched.body, note.body);
    assert_eq!(fetched.kind, NoteKind::Markdown);
}

#[tokio::test]
async fn soft_deleted_notes_are_excluded_unless_requested() {
    let adapter = test_adapter().await;
    let note = sample_note();
    adapter.upsert_note(&note, true).await.unwrap();

    adapter.soft_delete_note(note.sync_id, true).await.unwrap();

    assert!(adapter.get_note(note.sync_id, false).await.unwrap().is_none());
    let deleted = adapter.get_note(note.sync_id, true).await.unwrap().unwrap();
    assert!(deleted.is_deleted);
}

#[tokio::test]
async fn note_hash_is_stable_across_metadata_only_changes() {
    let adapter = test_adapter().await;
    let mut note = sample_note();
    let first = adapter.note_hash(&note);

    // Pin/favorite toggles are metadata, not content; the content hash must not move.
    note.pinned = true;
    note.favorite = true;
    let second = adapter.note_hash(&note);

    assert_eq!(first, second);
}

#[tokio::test]
async fn note_hash_changes_with_body() {
    let adapter = test_adapter().await;
    let mut note = sample_note();
    let first = adapter.note_hash(&note);

    note.body.push_str("- bread\n");
    let second = adapter.note_hash(&note);

    assert_ne!(first, second);
}

#[tokio::test]
async fn upsert_remote_deleted_todo_with_no_local_copy_is_a_no_op() {
    let adapter = test_adapter().await;
    let mut remote = sample_todo();
    remote.is_deleted = true;

    adapter.upsert_todo(&remote, true).await.unwrap();

    assert!(adapter.get_todo(remote.sync_id, true).await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_remote_deleted_todo_with_local_copy_soft_deletes_it() {
    let adapter = test_adapter().await;
    let local = sample_todo();
    adapter.upsert_todo(&local, true).await.unwrap();

    let mut remote = local.clone();
    remote.is_deleted = true;
    adapter.upsert_todo(&remote, true).await.unwrap();

    let stored = adapter.get_todo(local.sync_id, true).await.unwrap().unwrap();
    assert!(stored.is_deleted);
}

#[tokio::test]
async fn todos_hash_is_order_independent() {
    let adapter = test_adapter().await;
    let a = sample_todo();
    let b = sample_todo();

    let forward = adapter.todos_hash(&[a.clone(), b.clone()]);
    let backward = adapter.todos_hash(&[b, a]);

    assert_eq!(forward, backward);
}

#[tokio::test]
async fn settings_round_trip_typed_values() {
    let adapter = test_adapter().await;
    let mut values = HashMap::new();
    values.insert("theme".to_string(), json!("dark"));
    values.insert("autosave_interval_secs".to_string(), json!(30));
    values.insert("sync_enabled".to_string(), json!(true));

    adapter.update_settings(&values).await.unwrap();
    let fetched = adapter.get_all_settings().await.unwrap();

    assert_eq!(fetched.get("theme"), Some(&json!("dark")));
    assert_eq!(fetched.get("autosave_interval_secs"), Some(&json!(30.0)));
    assert_eq!(fetched.get("sync_enabled"), Some(&json!(true)));
}

#[tokio::test]
async fn get_all_notes_includes_only_requested_scope() {
    let adapter = test_adapter().await;
    let kept = sample_note();
    let removed = sample_note();
    adapter.upsert_note(&kept, true).await.unwrap();
    adapter.upsert_note(&removed, true).await.unwrap();
    adapter.soft_delete_note(removed.sync_id, true).await.unwrap();

    let active = adapter.get_all_notes(false).await.unwrap();
    assert_eq!(active.len(), 1);
    assert!(active.contains_key(&kept.sync_id));

    let all = adapter.get_all_notes(true).await.unwrap();
    assert_eq!(all.len(), 2);
}
