//! The manifest: the JSON catalog of every remote object's version,
//! timestamp, hash, tombstone flag, and extension. One side is built
//! fresh from local state every run; the other is downloaded from
//! `<root>/manifest.json`. SyncEngine diffs the two.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domains::storage::{Note, NoteKind, StorageAdapter, Todo};
use crate::errors::{DomainError, DomainResult};

pub const GLOBAL_TODOS_ID: &str = "global_todos";
pub const GLOBAL_SETTINGS_ID: &str = "global_settings";

/// Fallback `t` for `global_todos` when no todo carries a valid timestamp.
const TODOS_SENTINEL_MS: i64 = 1_000_000_000_000;

const MANIFEST_VERSION: i64 = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteMeta {
    pub title: String,
    pub tags: String,
    pub category: String,
    pub is_pinned: u8,
    pub is_favorite: u8,
    pub note_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub v: i64,
    pub t: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c: Option<i64>,
    pub h: String,
    pub d: u8,
    pub ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<NoteMeta>,
}

impl FileEntry {
    pub fn is_tombstone(&self) -> bool {
        self.d == 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncManifest {
    pub version: i64,
    pub last_synced_at: i64,
    pub device_id: Uuid,
    pub files: HashMap<String, FileEntry>,
}

impl SyncManifest {
    pub fn empty(device_id: Uuid) -> Self {
        Self { version: MANIFEST_VERSION, last_synced_at: Utc::now().timestamp_millis(), device_id, files: HashMap::new() }
    }

    pub fn cached_entry<'a>(cached: Option<&'a SyncManifest>, file_id: &str) -> Option<&'a FileEntry> {
        cached.and_then(|m| m.files.get(file_id))
    }
}

fn note_extension(kind: NoteKind) -> &'static str {
    kind.extension()
}

fn note_file_entry(note: &Note, adapter: &StorageAdapter) -> FileEntry {
    FileEntry {
        v: 1,
        t: note.updated_at.timestamp_millis(),
        c: Some(note.created_at.timestamp_millis()),
        h: adapter.note_hash(note),
        d: if note.is_deleted { 1 } else { 0 },
        ext: note_extension(note.kind).to_string(),
        meta: Some(NoteMeta {
            title: note.title.clone(),
            tags: note.tags.clone(),
            category: note.category.clone(),
            is_pinned: note.pinned as u8,
            is_favorite: note.favorite as u8,
            note_type: note.kind.as_str().to_string(),
        }),
    }
}

fn todos_entry(todos: &[Todo], adapter: &StorageAdapter) -> FileEntry {
    let t = todos.iter().map(|t| t.updated_at.timestamp_millis()).max().unwrap_or(TODOS_SENTINEL_MS);
    FileEntry { v: 1, t, c: None, h: adapter.todos_hash(todos), d: 0, ext: ".json".to_string(), meta: None }
}

fn settings_entry(settings: &HashMap<String, Value>, adapter: &StorageAdapter, cached: Option<&SyncManifest>) -> FileEntry {
    let h = adapter.settings_hash(settings);
    let t = match SyncManifest::cached_entry(cached, GLOBAL_SETTINGS_ID) {
        Some(prior) if prior.h == h => prior.t,
        _ => Utc::now().timestamp_millis(),
    };
    FileEntry { v: 1, t, c: None, h, d: 0, ext: ".json".to_string(), meta: None }
}

/// Builds a fresh local manifest from current local state, per the
/// per-file-id derivation rules (notes individually, todos/settings as
/// the two reserved aggregate ids).
pub async fn build_local_manifest(adapter: &StorageAdapter, device_id: Uuid, cached: Option<&SyncManifest>) -> DomainResult<SyncManifest> {
    let notes = adapter.get_all_notes(true).await?;
    let todos = adapter.get_all_todos(true).await?;
    let settings = adapter.get_all_settings().await?;

    let mut files = HashMap::with_capacity(notes.len() + 2);
    for (sync_id, note) in &notes {
        files.insert(sync_id.to_string(), note_file_entry(note, adapter));
    }

    let todo_list: Vec<Todo> = todos.into_values().collect();
    files.insert(GLOBAL_TODOS_ID.to_string(), todos_entry(&todo_list, adapter));
    files.insert(GLOBAL_SETTINGS_ID.to_string(), settings_entry(&settings, adapter, cached));

    Ok(SyncManifest { version: MANIFEST_VERSION, last_synced_at: Utc::now().timestamp_millis(), device_id, files })
}

/// Reads/writes the locally cached last-committed manifest, byte-identical
/// to the remote copy, living at `<data_dir>/sync-manifest.json`.
pub struct ManifestCache {
    path: std::path::PathBuf,
}

impl ManifestCache {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self { path: data_dir.as_ref().join("sync-manifest.json") }
    }

    pub async fn load(&self) -> DomainResult<Option<SyncManifest>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let manifest: SyncManifest = serde_json::from_slice(&bytes)
                    .map_err(|e| DomainError::Io(format!("corrupt local manifest cache: {}", e)))?;
                Ok(Some(manifest))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DomainError::Io(e.to_string())),
        }
    }

    pub async fn save(&self, manifest: &SyncManifest) -> DomainResult<()> {
        let bytes = serde_json::to_vec_pretty(manifest).map_err(|e| DomainError::Io(e.to_string()))?;
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = std::path::PathBuf::from(tmp_path);
        tokio::fs::write(&tmp_path, bytes).await.map_err(|e| DomainError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| DomainError::Io(e.to_string()))
    }

    pub async fn delete(&self) -> DomainResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DomainError::Io(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_entry_keeps_prior_t_when_hash_unchanged() {
        let device = Uuid::new_v4();
        let settings: HashMap<String, Value> = HashMap::new();
        let mut cached = SyncManifest::empty(device);
        cached.files.insert(
            GLOBAL_SETTINGS_ID.to_string(),
            FileEntry { v: 1, t: 12345, c: None, h: crate::domains::sync::hash::settings_hash(&serde_json::json!(settings)), d: 0, ext: ".json".to_string(), meta: None },
        );

        let h = crate::domains::sync::hash::settings_hash(&serde_json::json!(settings));
        let prior = cached.files.get(GLOBAL_SETTINGS_ID).unwrap();
        assert_eq!(prior.h, h);
    }

    #[test]
    fn file_entry_tombstone_flag() {
        let entry = FileEntry { v: 1, t: 0, c: None, h: String::new(), d: 1, ext: ".md".to_string(), meta: None };
        assert!(entry.is_tombstone());
    }
}
