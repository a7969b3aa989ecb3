//! The manifest-driven sync engine: Bootstrap, Scan & Diff, Execute,
//! Commit. This is the primary sync path; `legacy` is kept alongside it
//! for devices still running the change-log protocol.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ConflictStrategy;
use crate::context::DeviceContext;
use crate::domains::storage::{Note, NoteKind, StorageAdapter, Todo};
use crate::domains::sync::assets::{self, AssetStore};
use crate::domains::sync::manifest::{build_local_manifest, FileEntry, ManifestCache, NoteMeta, SyncManifest, GLOBAL_SETTINGS_ID, GLOBAL_TODOS_ID};
use crate::errors::{DomainError, SyncConflict, SyncError, SyncResult, TransportError};
use crate::transport::WebDavClient;

#[derive(Debug, Clone, Serialize, Default)]
pub struct SyncStatus {
    pub success: bool,
    pub uploaded: u64,
    pub downloaded: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub errors: u64,
    pub error_details: Vec<String>,
    pub duration_ms: u64,
    #[serde(skip)]
    pub conflicts: Vec<SyncConflict>,
    pub failed_asset_uploads: Vec<String>,
    pub failed_asset_downloads: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum BootstrapOutcome {
    AlreadyInitialized,
    Initialized { uploaded: u64, failed_asset_uploads: Vec<String> },
}

enum TaskKind {
    Skip,
    Upload,
    UploadNewExt { old_remote_path: String },
    Download,
    DeleteLocal,
    UploadDelete,
}

struct Task {
    file_id: String,
    kind: TaskKind,
}

/// Composes Transport + StorageAdapter + the local manifest cache into
/// the manifest-driven sync lifecycle.
pub struct SyncEngine {
    storage: Arc<StorageAdapter>,
    transport: Arc<WebDavClient>,
    root_path: String,
    device: DeviceContext,
    conflict_strategy: ConflictStrategy,
    manifest_cache: ManifestCache,
    asset_store: Arc<dyn AssetStore>,
    stop_flag: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(storage: Arc<StorageAdapter>, transport: Arc<WebDavClient>, root_path: String, device: DeviceContext, conflict_strategy: ConflictStrategy, data_dir: impl AsRef<std::path::Path>, asset_store: Arc<dyn AssetStore>) -> Self {
        Self {
            storage,
            transport,
            root_path,
            device,
            conflict_strategy,
            manifest_cache: ManifestCache::new(data_dir),
            asset_store,
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    fn should_stop(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    fn manifest_path(&self) -> String {
        format!("{}manifest.json", self.root_path)
    }

    fn todos_path(&self) -> String {
        format!("{}todos.json", self.root_path)
    }

    fn settings_path(&self) -> String {
        format!("{}settings.json", self.root_path)
    }

    fn note_path(&self, sync_id: &str, ext: &str) -> String {
        format!("{}notes/{}{}", self.root_path, sync_id, ext)
    }

    pub async fn perform_sync(&self) -> SyncResult<SyncStatus> {
        self.stop_flag.store(false, Ordering::SeqCst);
        let start = Instant::now();

        let outcome = self.bootstrap().await?;
        let mut status = match outcome {
            BootstrapOutcome::Initialized { uploaded, failed_asset_uploads } => SyncStatus { success: true, uploaded, failed_asset_uploads, ..Default::default() },
            BootstrapOutcome::AlreadyInitialized => self.scan_execute_commit().await?,
        };

        status.duration_ms = start.elapsed().as_millis() as u64;
        Ok(status)
    }

    pub async fn force_full_sync(&self) -> SyncResult<SyncStatus> {
        let _ = self.transport.delete(&self.manifest_path()).await;
        self.manifest_cache.delete().await.map_err(SyncError::Domain)?;
        self.perform_sync().await
    }

    /// Verifies the remote root; runs clean-slate initialization if
    /// either the root or its manifest is missing.
    async fn bootstrap(&self) -> SyncResult<BootstrapOutcome> {
        let root_exists = self.transport.exists(&self.root_path).await.map_err(|e| SyncError::Domain(DomainError::Transport(e)))?;
        let manifest_exists = self.transport.exists(&self.manifest_path()).await.map_err(|e| SyncError::Domain(DomainError::Transport(e)))?;

        if root_exists && manifest_exists {
            return Ok(BootstrapOutcome::AlreadyInitialized);
        }

        self.clean_slate_initialization().await
    }

    async fn clean_slate_initialization(&self) -> SyncResult<BootstrapOutcome> {
        let mut uploaded: u64 = 0;
        let mut failed_asset_uploads: Vec<String> = Vec::new();

        for dir in [self.root_path.clone(), format!("{}notes/", self.root_path), format!("{}images/", self.root_path), format!("{}images/whiteboard/", self.root_path)] {
            self.transport.create_directory(&dir).await.map_err(|e| SyncError::Domain(DomainError::Transport(e)))?;
        }

        let notes = self.storage.get_all_notes(false).await.map_err(SyncError::Domain)?;
        for note in notes.values() {
            let path = self.note_path(&note.sync_id.to_string(), note.kind.extension());
            self.transport.upload_text(&path, &note.body, None).await.map_err(|e| SyncError::Domain(DomainError::Transport(e)))?;
            uploaded += 1;

            let failed = assets::upload_missing_assets(note, &self.transport, &self.root_path, self.asset_store.as_ref()).await;
            uploaded += (assets::extract_asset_paths(note).len() - failed.len()) as u64;
            failed_asset_uploads.extend(failed);
        }

        let todos: Vec<Todo> = self.storage.get_all_todos(true).await.map_err(SyncError::Domain)?.into_values().collect();
        self.transport.upload_json(&self.todos_path(), &todos).await.map_err(|e| SyncError::Domain(DomainError::Transport(e)))?;
        uploaded += 1;

        let settings = self.storage.get_all_settings().await.map_err(SyncError::Domain)?;
        self.transport.upload_json(&self.settings_path(), &settings).await.map_err(|e| SyncError::Domain(DomainError::Transport(e)))?;
        uploaded += 1;

        let manifest = build_local_manifest(&self.storage, self.device.device_id, None).await.map_err(SyncError::Domain)?;
        self.transport.upload_json(&self.manifest_path(), &manifest).await.map_err(|e| SyncError::Domain(DomainError::Transport(e)))?;
        uploaded += 1;

        self.manifest_cache.save(&manifest).await.map_err(SyncError::Domain)?;

        Ok(BootstrapOutcome::Initialized { uploaded, failed_asset_uploads })
    }

    async fn scan_execute_commit(&self) -> SyncResult<SyncStatus> {
        let remote_manifest: SyncManifest = self.transport.download_json(&self.manifest_path()).await.map_err(|e| SyncError::Domain(DomainError::Transport(e)))?;
        let cached = self.manifest_cache.load().await.map_err(SyncError::Domain)?;
        let local_manifest = build_local_manifest(&self.storage, self.device.device_id, cached.as_ref()).await.map_err(SyncError::Domain)?;

        let mut file_ids: HashSet<String> = HashSet::new();
        file_ids.extend(remote_manifest.files.keys().cloned());
        file_ids.extend(local_manifest.files.keys().cloned());

        let mut status = SyncStatus::default();
        let mut tasks = Vec::new();

        for file_id in file_ids {
            let remote_entry = remote_manifest.files.get(&file_id);
            let local_entry = local_manifest.files.get(&file_id);
            let cached_entry = cached.as_ref().and_then(|m| m.files.get(&file_id));

            let (kind, conflict) = self.decide_task(&file_id, remote_entry, local_entry, cached_entry);
            if let Some(conflict) = conflict {
                status.conflicts.push(conflict);
            }
            tasks.push(Task { file_id, kind });
        }

        for task in &tasks {
            if self.should_stop() {
                break;
            }

            let remote_entry = remote_manifest.files.get(&task.file_id).cloned();
            let local_entry = local_manifest.files.get(&task.file_id).cloned();

            match self.execute_task(task, remote_entry.as_ref(), local_entry.as_ref()).await {
                Ok(TaskOutcome::Uploaded(failed)) => {
                    status.uploaded += 1;
                    status.failed_asset_uploads.extend(failed);
                }
                Ok(TaskOutcome::Downloaded(failed)) => {
                    status.downloaded += 1;
                    status.failed_asset_downloads.extend(failed);
                }
                Ok(TaskOutcome::Deleted) => status.deleted += 1,
                Ok(TaskOutcome::Skipped) => status.skipped += 1,
                Err(e) => {
                    status.errors += 1;
                    status.error_details.push(format!("{}: {}", task.file_id, e));
                }
            }
        }

        status.success = status.errors == 0;

        if status.success {
            self.commit(&remote_manifest, &local_manifest, &tasks).await?;
        }

        Ok(status)
    }

    /// Implements the Scan & Diff decision table.
    fn decide_task(&self, file_id: &str, remote: Option<&FileEntry>, local: Option<&FileEntry>, cached: Option<&FileEntry>) -> (TaskKind, Option<SyncConflict>) {
        let is_global = file_id == GLOBAL_TODOS_ID || file_id == GLOBAL_SETTINGS_ID;

        let (remote, local) = match (remote, local) {
            (None, None) => return (TaskKind::Skip, None),
            (Some(r), None) => return (if r.is_tombstone() { TaskKind::Skip } else { TaskKind::Download }, None),
            (None, Some(l)) => return (if l.is_tombstone() { TaskKind::Skip } else { TaskKind::Upload }, None),
            (Some(r), Some(l)) => (r, l),
        };

        if remote.is_tombstone() && local.is_tombstone() {
            return (TaskKind::Skip, None);
        }
        if remote.is_tombstone() && !local.is_tombstone() {
            return (if remote.t >= local.t { TaskKind::DeleteLocal } else { TaskKind::Upload }, None);
        }
        if !remote.is_tombstone() && local.is_tombstone() {
            return (TaskKind::UploadDelete, None);
        }
        if remote.ext != local.ext {
            return (
                if local.t >= remote.t { TaskKind::UploadNewExt { old_remote_path: self.note_path(file_id, &remote.ext) } } else { TaskKind::Download },
                None,
            );
        }
        if remote.h == local.h {
            return (TaskKind::Skip, None);
        }

        let local_changed = cached.map(|c| c.h != local.h).unwrap_or(true);
        let remote_changed = cached.map(|c| c.h != remote.h).unwrap_or(true);

        if local_changed && remote_changed && !is_global {
            let conflict = (self.conflict_strategy == ConflictStrategy::Ask).then(|| SyncConflict {
                file_id: file_id.to_string(),
                file_kind: "note".to_string(),
                file_name: local.meta.as_ref().map(|m| m.title.clone()).unwrap_or_default(),
                local_time: local.t,
                remote_time: remote.t,
                message: "concurrent edit".to_string(),
            });

            let kind = match self.conflict_strategy {
                ConflictStrategy::Local => TaskKind::Upload,
                ConflictStrategy::Remote => TaskKind::Download,
                ConflictStrategy::Ask if remote.t > local.t => TaskKind::Download,
                ConflictStrategy::Ask => TaskKind::Upload,
            };
            (kind, conflict)
        } else if remote.t > local.t {
            (TaskKind::Download, None)
        } else {
            (TaskKind::Upload, None)
        }
    }

    async fn execute_task(&self, task: &Task, remote_entry: Option<&FileEntry>, local_entry: Option<&FileEntry>) -> Result<TaskOutcome, TransportError> {
        match &task.kind {
            TaskKind::Skip => Ok(TaskOutcome::Skipped),
            TaskKind::Upload | TaskKind::UploadNewExt { .. } => {
                let failed = self.execute_upload(&task.file_id, local_entry).await?;
                if let TaskKind::UploadNewExt { old_remote_path } = &task.kind {
                    let _ = self.transport.delete(old_remote_path).await;
                }
                Ok(TaskOutcome::Uploaded(failed))
            }
            TaskKind::Download => {
                let failed = self.execute_download(&task.file_id, remote_entry).await?;
                Ok(TaskOutcome::Downloaded(failed))
            }
            TaskKind::DeleteLocal => {
                self.execute_delete_local(&task.file_id).await?;
                Ok(TaskOutcome::Deleted)
            }
            TaskKind::UploadDelete => {
                let ext = local_entry.map(|e| e.ext.clone()).or_else(|| remote_entry.map(|e| e.ext.clone())).unwrap_or_else(|| ".md".to_string());
                let path = self.note_path(&task.file_id, &ext);
                self.transport.delete(&path).await?;
                Ok(TaskOutcome::Deleted)
            }
        }
    }

    async fn execute_upload(&self, file_id: &str, local_entry: Option<&FileEntry>) -> Result<Vec<String>, TransportError> {
        if file_id == GLOBAL_TODOS_ID {
            let todos: Vec<Todo> = self.storage.get_all_todos(true).await.map_err(|e| TransportError::LocalStoreError(e.to_string()))?.into_values().collect();
            self.transport.upload_json(&self.todos_path(), &todos).await?;
            return Ok(Vec::new());
        }
        if file_id == GLOBAL_SETTINGS_ID {
            let settings = self.storage.get_all_settings().await.map_err(|e| TransportError::LocalStoreError(e.to_string()))?;
            self.transport.upload_json(&self.settings_path(), &settings).await?;
            return Ok(Vec::new());
        }

        let sync_id = Uuid::parse_str(file_id).map_err(|_| TransportError::DeserializationError(format!("invalid file id {}", file_id)))?;
        let note = self
            .storage
            .get_note(sync_id, true)
            .await
            .map_err(|e| TransportError::LocalStoreError(e.to_string()))?
            .ok_or_else(|| TransportError::NotFound)?;

        let ext = local_entry.map(|e| e.ext.as_str()).unwrap_or(note.kind.extension());
        let path = self.note_path(file_id, ext);
        self.transport.upload_text(&path, &note.body, None).await?;

        Ok(assets::upload_missing_assets(&note, &self.transport, &self.root_path, self.asset_store.as_ref()).await)
    }

    async fn execute_download(&self, file_id: &str, remote_entry: Option<&FileEntry>) -> Result<Vec<String>, TransportError> {
        if file_id == GLOBAL_TODOS_ID {
            let todos: Vec<Todo> = self.transport.download_json(&self.todos_path()).await?;
            for todo in todos {
                self.storage.upsert_todo(&todo, true).await.map_err(|e| TransportError::LocalStoreError(e.to_string()))?;
            }
            return Ok(Vec::new());
        }
        if file_id == GLOBAL_SETTINGS_ID {
            let settings: std::collections::HashMap<String, serde_json::Value> = self.transport.download_json(&self.settings_path()).await?;
            self.storage.update_settings(&settings).await.map_err(|e| TransportError::LocalStoreError(e.to_string()))?;
            return Ok(Vec::new());
        }

        let entry = remote_entry.ok_or_else(|| TransportError::NotFound)?;
        let primary_path = self.note_path(file_id, &entry.ext);
        let body = match self.transport.download_text(&primary_path).await {
            Ok(body) => body,
            Err(TransportError::NotFound) => {
                let alternate_ext = if entry.ext == ".md" { ".wb" } else { ".md" };
                self.transport.download_text(&self.note_path(file_id, alternate_ext)).await?
            }
            Err(e) => return Err(e),
        };

        let sync_id = Uuid::parse_str(file_id).map_err(|_| TransportError::DeserializationError(format!("invalid file id {}", file_id)))?;
        let note = note_from_entry(sync_id, entry, body);

        self.storage.upsert_note(&note, true).await.map_err(|e| TransportError::LocalStoreError(e.to_string()))?;
        Ok(assets::download_missing_assets(&note, &self.transport, &self.root_path, self.asset_store.as_ref()).await)
    }

    async fn execute_delete_local(&self, file_id: &str) -> Result<(), TransportError> {
        let sync_id = Uuid::parse_str(file_id).map_err(|_| TransportError::DeserializationError(format!("invalid file id {}", file_id)))?;
        let is_note = self.storage.get_note(sync_id, true).await.map_err(|e| TransportError::LocalStoreError(e.to_string()))?.is_some();
        if is_note {
            self.storage.soft_delete_note(sync_id, true).await.map_err(|e| TransportError::LocalStoreError(e.to_string()))?;
        } else {
            self.storage.soft_delete_todo(sync_id, true).await.map_err(|e| TransportError::LocalStoreError(e.to_string()))?;
        }
        Ok(())
    }

    async fn commit(&self, remote_snapshot: &SyncManifest, local_manifest: &SyncManifest, tasks: &[Task]) -> SyncResult<()> {
        let mut files = remote_snapshot.files.clone();

        for task in tasks {
            match &task.kind {
                TaskKind::Upload | TaskKind::UploadNewExt { .. } | TaskKind::UploadDelete => {
                    if let Some(entry) = local_manifest.files.get(&task.file_id) {
                        files.insert(task.file_id.clone(), entry.clone());
                    }
                }
                TaskKind::Download | TaskKind::Skip | TaskKind::DeleteLocal => {}
            }
        }

        let new_manifest = SyncManifest { version: remote_snapshot.version, last_synced_at: Utc::now().timestamp_millis(), device_id: self.device.device_id, files };

        self.transport.upload_json(&self.manifest_path(), &new_manifest).await.map_err(|e| SyncError::Domain(DomainError::Transport(e)))?;
        self.manifest_cache.save(&new_manifest).await.map_err(SyncError::Domain)?;
        Ok(())
    }
}

enum TaskOutcome {
    Uploaded(Vec<String>),
    Downloaded(Vec<String>),
    Deleted,
    Skipped,
}

fn note_from_entry(sync_id: Uuid, entry: &FileEntry, body: String) -> Note {
    let meta = entry.meta.clone().unwrap_or_else(default_meta);
    let kind = NoteKind::from_str(&meta.note_type).unwrap_or_else(|| if entry.ext == ".wb" { NoteKind::Whiteboard } else { NoteKind::Markdown });
    let updated_at = ms_to_datetime(entry.t);

    Note {
        sync_id,
        title: meta.title,
        body,
        kind,
        tags: meta.tags,
        category: meta.category,
        pinned: meta.is_pinned != 0,
        favorite: meta.is_favorite != 0,
        created_at: entry.c.map(ms_to_datetime).unwrap_or(updated_at),
        updated_at,
        is_deleted: entry.d == 1,
        deleted_at: if entry.d == 1 { Some(updated_at) } else { None },
    }
}

fn default_meta() -> NoteMeta {
    NoteMeta { title: String::new(), tags: String::new(), category: String::new(), is_pinned: 0, is_favorite: 0, note_type: "markdown".to_string() }
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::storage::repository::{SqliteNoteRepository, SqliteSettingRepository, SqliteTodoRepository};
    use crate::domains::sync::assets::FsAssetStore;

    #[test]
    fn ms_to_datetime_round_trips() {
        let now = Utc::now();
        let ms = now.timestamp_millis();
        let back = ms_to_datetime(ms);
        assert_eq!(back.timestamp_millis(), ms);
    }

    async fn build_test_engine() -> (SyncEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("test.db");
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy(&format!("sqlite://{}?mode=rwc", db_path.display()))
            .expect("pool opens");
        crate::db_migration::initialize_database(&pool).await.expect("migrations apply");

        let notes = Arc::new(SqliteNoteRepository::new(pool.clone()));
        let todos = Arc::new(SqliteTodoRepository::new(pool.clone()));
        let settings = Arc::new(SqliteSettingRepository::new(pool.clone()));
        let storage = Arc::new(StorageAdapter::new(notes, todos, settings));

        // Points nowhere reachable; the tests below never let the engine perform I/O.
        let transport = Arc::new(WebDavClient::new("http://127.0.0.1:9/unused", "user", "pass", 1, 0, 1));
        let asset_store: Arc<dyn AssetStore> = Arc::new(FsAssetStore::new(dir.path().join("assets")));
        let device = DeviceContext::new(Uuid::new_v4(), false);

        let engine = SyncEngine::new(storage, transport, "/FlashNote/".to_string(), device, ConflictStrategy::Ask, dir.path(), asset_store);
        (engine, dir)
    }

    fn note_entry(t: i64, h: &str, d: u8, ext: &str) -> FileEntry {
        FileEntry { v: 1, t, c: None, h: h.to_string(), d, ext: ext.to_string(), meta: Some(NoteMeta::default()) }
    }

    #[tokio::test]
    async fn stop_sets_should_stop() {
        let (engine, _dir) = build_test_engine().await;
        assert!(!engine.should_stop());
        engine.stop();
        assert!(engine.should_stop());
    }

    #[tokio::test]
    async fn decide_task_skips_when_both_sides_are_tombstones() {
        let (engine, _dir) = build_test_engine().await;
        let remote = note_entry(100, "h", 1, ".md");
        let local = note_entry(90, "h", 1, ".md");
        let (kind, conflict) = engine.decide_task("id1", Some(&remote), Some(&local), None);
        assert!(matches!(kind, TaskKind::Skip));
        assert!(conflict.is_none());
    }

    #[tokio::test]
    async fn decide_task_deletes_local_when_remote_tombstone_is_newer() {
        let (engine, _dir) = build_test_engine().await;
        let remote = note_entry(200, "h", 1, ".md");
        let local = note_entry(100, "h", 0, ".md");
        let (kind, _) = engine.decide_task("id1", Some(&remote), Some(&local), None);
        assert!(matches!(kind, TaskKind::DeleteLocal));
    }

    #[tokio::test]
    async fn decide_task_uploads_when_local_outlives_an_older_remote_tombstone() {
        let (engine, _dir) = build_test_engine().await;
        let remote = note_entry(100, "h", 1, ".md");
        let local = note_entry(200, "h2", 0, ".md");
        let (kind, _) = engine.decide_task("id1", Some(&remote), Some(&local), None);
        assert!(matches!(kind, TaskKind::Upload));
    }

    #[tokio::test]
    async fn decide_task_propagates_local_tombstone_as_upload_delete() {
        let (engine, _dir) = build_test_engine().await;
        let remote = note_entry(100, "h", 0, ".md");
        let local = note_entry(200, "h", 1, ".md");
        let (kind, _) = engine.decide_task("id1", Some(&remote), Some(&local), None);
        assert!(matches!(kind, TaskKind::UploadDelete));
    }

    #[tokio::test]
    async fn decide_task_resolves_extension_mismatch_by_newer_side() {
        let (engine, _dir) = build_test_engine().await;
        let remote = note_entry(100, "h", 0, ".md");
        let local = note_entry(200, "h2", 0, ".wb");
        let (kind, _) = engine.decide_task("id1", Some(&remote), Some(&local), None);
        assert!(matches!(kind, TaskKind::UploadNewExt { .. }));
    }

    #[tokio::test]
    async fn decide_task_flags_concurrent_edit_as_conflict_under_ask_strategy() {
        let (engine, _dir) = build_test_engine().await;
        let cached = note_entry(50, "base", 0, ".md");
        let remote = note_entry(150, "remote-edit", 0, ".md");
        let local = note_entry(140, "local-edit", 0, ".md");
        let (kind, conflict) = engine.decide_task("id1", Some(&remote), Some(&local), Some(&cached));
        assert!(matches!(kind, TaskKind::Download));
        assert!(conflict.is_some());
    }

    #[tokio::test]
    async fn decide_task_never_conflicts_on_global_aggregate_ids() {
        let (engine, _dir) = build_test_engine().await;
        let cached = note_entry(50, "base", 0, ".json");
        let remote = note_entry(150, "remote-edit", 0, ".json");
        let local = note_entry(140, "local-edit", 0, ".json");
        let (kind, conflict) = engine.decide_task(GLOBAL_TODOS_ID, Some(&remote), Some(&local), Some(&cached));
        assert!(matches!(kind, TaskKind::Download));
        assert!(conflict.is_none());
    }

    #[tokio::test]
    async fn decide_task_skips_identical_hashes() {
        let (engine, _dir) = build_test_engine().await;
        let remote = note_entry(100, "same", 0, ".md");
        let local = note_entry(200, "same", 0, ".md");
        let (kind, _) = engine.decide_task("id1", Some(&remote), Some(&local), None);
        assert!(matches!(kind, TaskKind::Skip));
    }
}
