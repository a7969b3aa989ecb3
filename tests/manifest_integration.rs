//! Exercises manifest construction against a populated `StorageAdapter`,
//! through the public crate surface only.

use std::sync::Arc;

use chrono::Utc;
use flashnote_sync_core::domains::storage::{
    Note, NoteKind, SqliteNoteRepository, SqliteSettingRepository, SqliteTodoRepository, StorageAdapter, Todo,
};
use flashnote_sync_core::domains::sync::manifest::{build_local_manifest, GLOBAL_SETTINGS_ID, GLOBAL_TODOS_ID};
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

fn note(title: &str) -> Note {
    let now = Utc::now();
    Note {
        sync_id: Uuid::new_v4(),
        title: title.to_string(),
        body: "hello".to_string(),
        kind: NoteKind::Markdown,
        tags: String::new(),
        category: String::new(),
        pinned: false,
        favorite: false,
        created_at: now,
        updated_at: now,
        is_deleted: false,
        deleted_at: None,
    }
}

fn todo(content: &str) -> Todo {
    let now = Utc::now();
    Todo {
        sync_id: Uuid::new_v4(),
        content: content.to_string(),
        description: String::new(),
        tags: String::new(),
        important: false,
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
async fn fresh_device_manifest_has_only_the_two_aggregate_entries() {
    let adapter = test_adapter().await;
    let device_id = Uuid::new_v4();

    let manifest = build_local_manifest(&adapter, device_id, None).await.unwrap();

    assert_eq!(manifest.files.len(), 2);
    assert!(manifest.files.contains_key(GLOBAL_TODOS_ID));
    assert!(manifest.files.contains_key(GLOBAL_SETTINGS_ID));
    assert_eq!(manifest.device_id, device_id);
}

#[tokio::test]
async fn manifest_gains_one_entry_per_note_keyed_by_sync_id() {
    let adapter = test_adapter().await;
    let a = note("First");
    let b = note("Second");
    adapter.upsert_note(&a, true).await.unwrap();
    adapter.upsert_note(&b, true).await.unwrap();

    let manifest = build_local_manifest(&adapter, Uuid::new_v4(), None).await.unwrap();

    assert_eq!(manifest.files.len(), 4);
    let entry_a = manifest.files.get(&a.sync_id.to_string()).unwrap();
    assert_eq!(entry_a.ext, ".md");
    assert!(!entry_a.is_tombstone());
    assert_eq!(entry_a.meta.as_ref().unwrap().title, "First");
}

#[tokio::test]
async fn deleted_note_surfaces_as_a_tombstone_entry() {
    let adapter = test_adapter().await;
    let n = note("Gone soon");
    adapter.upsert_note(&n, true).await.unwrap();
    adapter.soft_delete_note(n.sync_id, true).await.unwrap();

    let manifest = build_local_manifest(&adapter, Uuid::new_v4(), None).await.unwrap();

    let entry = manifest.files.get(&n.sync_id.to_string()).unwrap();
    assert!(entry.is_tombstone());
}

#[tokio::test]
async fn todos_aggregate_entry_reflects_latest_update_timestamp() {
    let adapter = test_adapter().await;
    let mut older = todo("older");
    older.updated_at = Utc::now() - chrono::Duration::days(1);
    let newer = todo("newer");
    adapter.upsert_todo(&older, true).await.unwrap();
    adapter.upsert_todo(&newer, true).await.unwrap();

    let manifest = build_local_manifest(&adapter, Uuid::new_v4(), None).await.unwrap();

    let entry = manifest.files.get(GLOBAL_TODOS_ID).unwrap();
    assert_eq!(entry.t, newer.updated_at.timestamp_millis());
}

#[tokio::test]
async fn settings_entry_keeps_cached_timestamp_when_content_is_unchanged() {
    let adapter = test_adapter().await;
    let first = build_local_manifest(&adapter, Uuid::new_v4(), None).await.unwrap();
    let first_settings = first.files.get(GLOBAL_SETTINGS_ID).unwrap().clone();

    // No settings were written between builds; the hash is identical, so the
    // second build must not bump the aggregate's timestamp.
    let second = build_local_manifest(&adapter, Uuid::new_v4(), Some(&first)).await.unwrap();
    let second_settings = second.files.get(GLOBAL_SETTINGS_ID).unwrap();

    assert_eq!(second_settings.h, first_settings.h);
    assert_eq!(second_settings.t, first_settings.t);
}
