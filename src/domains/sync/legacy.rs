//! The legacy change-log incremental protocol. Coexists with the
//! manifest-driven `SyncEngine`; the orchestrator picks one per run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::ConflictStrategy;
use crate::context::DeviceContext;
use crate::domains::storage::{Note, StorageAdapter, Todo};
use crate::domains::sync::change_log::{ChangeLogEntry, ChangeLogRepository, ChangeOperation, EntityType, NewChange};
use crate::errors::{DomainError, SyncConflict, SyncError, SyncResult};
use crate::transport::{ListDepth, WebDavClient};

const PUSH_BATCH_SIZE: i64 = 50;
const DEFAULT_LOOKBACK_DAYS: i64 = 30;
const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeRecord {
    id: i64,
    entity_id: String,
    operation: String,
    change_data: Option<Value>,
    timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePackage {
    entity_type: String,
    changes: Vec<ChangeRecord>,
    timestamp: String,
    device_id: String,
    count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IncrementalStatus {
    pub needs_full_sync: bool,
    pub pushed: usize,
    pub pulled: usize,
    pub conflicts: Vec<SyncConflict>,
    pub errors: Vec<String>,
}

/// Local artifacts this protocol owns: `last-sync-time.txt` and the
/// `sync-initialized.marker` presence file.
struct LocalArtifacts {
    data_dir: PathBuf,
}

impl LocalArtifacts {
    fn new(data_dir: impl AsRef<Path>) -> Self {
        Self { data_dir: data_dir.as_ref().to_path_buf() }
    }

    fn marker_path(&self) -> PathBuf {
        self.data_dir.join("sync-initialized.marker")
    }

    fn last_sync_time_path(&self) -> PathBuf {
        self.data_dir.join("last-sync-time.txt")
    }

    async fn is_initialized(&self) -> bool {
        tokio::fs::metadata(self.marker_path()).await.is_ok()
    }

    async fn last_sync_time(&self) -> DateTime<Utc> {
        match tokio::fs::read_to_string(self.last_sync_time_path()).await {
            Ok(text) => DateTime::parse_from_rfc3339(text.trim()).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now() - ChronoDuration::days(DEFAULT_LOOKBACK_DAYS)),
            Err(_) => Utc::now() - ChronoDuration::days(DEFAULT_LOOKBACK_DAYS),
        }
    }

    async fn write_last_sync_time(&self, at: DateTime<Utc>) -> SyncResult<()> {
        let final_path = self.last_sync_time_path();
        let mut tmp_path = final_path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        tokio::fs::write(&tmp_path, at.to_rfc3339()).await.map_err(|e| SyncError::Domain(DomainError::Io(e.to_string())))?;
        tokio::fs::rename(&tmp_path, &final_path).await.map_err(|e| SyncError::Domain(DomainError::Io(e.to_string())))
    }
}

/// The legacy journal-replication protocol: push unsynced local changes
/// as change packages, pull and apply remote ones.
pub struct LegacyIncrementalSync {
    storage: Arc<StorageAdapter>,
    change_log: Arc<dyn ChangeLogRepository>,
    transport: Arc<WebDavClient>,
    root_path: String,
    device: DeviceContext,
    conflict_strategy: ConflictStrategy,
    artifacts: LocalArtifacts,
    stop_flag: Arc<AtomicBool>,
}

impl LegacyIncrementalSync {
    pub fn new(
        storage: Arc<StorageAdapter>,
        change_log: Arc<dyn ChangeLogRepository>,
        transport: Arc<WebDavClient>,
        root_path: String,
        device: DeviceContext,
        conflict_strategy: ConflictStrategy,
        data_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            storage,
            change_log,
            transport,
            root_path,
            device,
            conflict_strategy,
            artifacts: LocalArtifacts::new(data_dir),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Halts push/pull at the next batch boundary.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    fn should_stop(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    pub async fn perform_incremental_sync(&self) -> SyncResult<IncrementalStatus> {
        self.stop_flag.store(false, Ordering::SeqCst);

        if self.needs_full_sync().await? {
            return Ok(IncrementalStatus { needs_full_sync: true, ..Default::default() });
        }

        let mut status = IncrementalStatus::default();

        status.pushed = self.push(&mut status).await?;
        if !self.should_stop() {
            status.pulled = self.pull(&mut status).await?;
        }

        let _ = self.change_log.cleanup_old(RETENTION_DAYS).await;
        Ok(status)
    }

    /// No marker present, OR local is empty AND remote has data, means a
    /// full bootstrap is required. Network failure while probing must
    /// propagate rather than be assumed to mean "needs full sync".
    async fn needs_full_sync(&self) -> SyncResult<bool> {
        if !self.artifacts.is_initialized().await {
            return Ok(true);
        }

        let notes = self.storage.get_all_notes(true).await.map_err(SyncError::Domain)?;
        let todos = self.storage.get_all_todos(true).await.map_err(SyncError::Domain)?;
        if !notes.is_empty() || !todos.is_empty() {
            return Ok(false);
        }

        let manifest_path = format!("{}manifest.json", self.root_path);
        let remote_has_data = self.transport.exists(&manifest_path).await.map_err(|e| SyncError::Domain(DomainError::Transport(e)))?;

        Ok(remote_has_data)
    }

    async fn push(&self, status: &mut IncrementalStatus) -> SyncResult<usize> {
        let mut pushed = 0usize;

        loop {
            if self.should_stop() {
                break;
            }

            let batch = self.change_log.unsynced(PUSH_BATCH_SIZE).await.map_err(SyncError::Domain)?;
            if batch.is_empty() {
                break;
            }

            let mut grouped: HashMap<EntityType, Vec<&ChangeLogEntry>> = HashMap::new();
            for entry in &batch {
                grouped.entry(entry.entity_type).or_default().push(entry);
            }

            let mut any_marked = false;
            for (entity_type, entries) in grouped {
                let package = ChangePackage {
                    entity_type: entity_type.as_str().to_string(),
                    changes: entries.iter().map(|e| to_change_record(e)).collect(),
                    timestamp: Utc::now().to_rfc3339(),
                    device_id: self.device.device_id.to_string(),
                    count: entries.len(),
                };

                let remote_path = format!("{}incremental/changes-{}-{}-{}.json", self.root_path, entity_type.as_str(), self.device.device_id, Utc::now().timestamp_millis());

                match self.transport.upload_json(&remote_path, &package).await {
                    Ok(()) => {
                        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
                        self.change_log.mark_synced(&ids).await.map_err(SyncError::Domain)?;
                        pushed += ids.len();
                        any_marked = true;
                    }
                    Err(e) => {
                        status.errors.push(format!("push failed for {}: {}", entity_type.as_str(), e));
                    }
                }

                if self.should_stop() {
                    break;
                }
            }

            if !any_marked {
                break;
            }
        }

        Ok(pushed)
    }

    async fn pull(&self, status: &mut IncrementalStatus) -> SyncResult<usize> {
        let since = self.artifacts.last_sync_time().await;
        let records = self.fetch_changes_since(since).await?;
        let mut applied = 0usize;

        for (entity_type, record) in records {
            if self.should_stop() {
                break;
            }

            match self.apply_change(entity_type, &record).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(SyncError::UserInterventionRequired(conflict)) => status.conflicts.push(conflict),
                Err(e) => status.errors.push(e.to_string()),
            }
        }

        self.artifacts.write_last_sync_time(Utc::now()).await?;
        Ok(applied)
    }

    async fn fetch_changes_since(&self, since: DateTime<Utc>) -> SyncResult<Vec<(EntityType, ChangeRecord)>> {
        let dir = format!("{}incremental/", self.root_path);
        let entries = match self.transport.list(&dir, ListDepth::One).await {
            Ok(entries) => entries,
            Err(crate::errors::TransportError::NotFound) => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::Domain(DomainError::Transport(e))),
        };

        let since_ms = since.timestamp_millis();
        let mut out = Vec::new();

        for entry in entries {
            if entry.is_directory {
                continue;
            }
            let Some(file_name) = entry.href.rsplit('/').next() else { continue };
            let Some((entity_type, ts)) = parse_change_filename(file_name) else { continue };
            if ts <= since_ms {
                continue;
            }

            let path = format!("{}{}", dir, file_name);
            let package: ChangePackage = match self.transport.download_json(&path).await {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("failed to download change package {}: {}", path, e);
                    continue;
                }
            };

            for change in package.changes {
                out.push((entity_type, change));
            }
        }

        out.sort_by_key(|(_, c)| c.id);
        Ok(out)
    }

    /// Applies one remote change; returns `Ok(true)` if it mutated local
    /// state, `Ok(false)` if it was a legitimate no-op.
    async fn apply_change(&self, entity_type: EntityType, record: &ChangeRecord) -> SyncResult<bool> {
        let operation = ChangeOperation::from_str(&record.operation)
            .ok_or_else(|| SyncError::Domain(DomainError::Internal(format!("unknown change operation: {}", record.operation))))?;
        let entity_id = Uuid::parse_str(&record.entity_id).map_err(|_| SyncError::Domain(DomainError::InvalidUuid(record.entity_id.clone())))?;
        let remote_timestamp = DateTime::parse_from_rfc3339(&record.timestamp).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now());

        match entity_type {
            EntityType::Note => self.apply_note_change(entity_id, operation, record.change_data.as_ref(), remote_timestamp).await,
            EntityType::Todo => self.apply_todo_change(entity_id, operation, record.change_data.as_ref(), remote_timestamp).await,
        }
    }

    async fn apply_note_change(&self, sync_id: Uuid, operation: ChangeOperation, payload: Option<&Value>, remote_timestamp: DateTime<Utc>) -> SyncResult<bool> {
        match operation {
            ChangeOperation::Create => {
                let Some(payload) = payload else { return Ok(false) };
                let note: Note = serde_json::from_value(payload.clone()).map_err(|e| SyncError::Domain(DomainError::Internal(e.to_string())))?;
                self.storage.upsert_note(&note, true).await.map_err(SyncError::Domain)?;
                Ok(true)
            }
            ChangeOperation::Update => {
                let Some(local) = self.storage.get_note(sync_id, true).await.map_err(SyncError::Domain)? else {
                    log::info!("skipping update for unknown note {}", sync_id);
                    return Ok(false);
                };
                let Some(payload) = payload else { return Ok(false) };
                let remote: Note = serde_json::from_value(payload.clone()).map_err(|e| SyncError::Domain(DomainError::Internal(e.to_string())))?;

                if !notes_differ_on_key_fields(&local, &remote) || local.updated_at.timestamp_millis() <= remote_timestamp.timestamp_millis() {
                    self.storage.upsert_note(&remote, true).await.map_err(SyncError::Domain)?;
                    return Ok(true);
                }

                self.resolve_note_conflict(local, remote, remote_timestamp).await
            }
            ChangeOperation::Delete => {
                let Some(local) = self.storage.get_note(sync_id, true).await.map_err(SyncError::Domain)? else {
                    return Ok(false);
                };
                if local.updated_at > remote_timestamp {
                    return Err(SyncError::UserInterventionRequired(SyncConflict {
                        file_id: sync_id.to_string(),
                        file_kind: "note".to_string(),
                        file_name: local.title.clone(),
                        local_time: local.updated_at.timestamp_millis(),
                        remote_time: remote_timestamp.timestamp_millis(),
                        message: "delete-update-conflict".to_string(),
                    }));
                }
                self.storage.soft_delete_note(sync_id, true).await.map_err(SyncError::Domain)?;
                Ok(true)
            }
            ChangeOperation::Restore => {
                let Some(local) = self.storage.get_note(sync_id, true).await.map_err(SyncError::Domain)? else {
                    return Ok(false);
                };
                if !local.is_deleted {
                    return Ok(false);
                }
                if local.deleted_at.map(|d| d > remote_timestamp).unwrap_or(false) {
                    return Err(SyncError::UserInterventionRequired(SyncConflict {
                        file_id: sync_id.to_string(),
                        file_kind: "note".to_string(),
                        file_name: local.title.clone(),
                        local_time: local.deleted_at.map(|d| d.timestamp_millis()).unwrap_or_default(),
                        remote_time: remote_timestamp.timestamp_millis(),
                        message: "restore-delete-conflict".to_string(),
                    }));
                }
                let mut restored = local;
                restored.is_deleted = false;
                restored.deleted_at = None;
                self.storage.upsert_note(&restored, true).await.map_err(SyncError::Domain)?;
                Ok(true)
            }
        }
    }

    async fn apply_todo_change(&self, sync_id: Uuid, operation: ChangeOperation, payload: Option<&Value>, remote_timestamp: DateTime<Utc>) -> SyncResult<bool> {
        match operation {
            ChangeOperation::Create => {
                let Some(payload) = payload else { return Ok(false) };
                let todo: Todo = serde_json::from_value(payload.clone()).map_err(|e| SyncError::Domain(DomainError::Internal(e.to_string())))?;
                self.storage.upsert_todo(&todo, true).await.map_err(SyncError::Domain)?;
                Ok(true)
            }
            ChangeOperation::Update => {
                let Some(local) = self.storage.get_todo(sync_id, true).await.map_err(SyncError::Domain)? else {
                    log::info!("skipping update for unknown todo {}", sync_id);
                    return Ok(false);
                };
                let Some(payload) = payload else { return Ok(false) };
                let remote: Todo = serde_json::from_value(payload.clone()).map_err(|e| SyncError::Domain(DomainError::Internal(e.to_string())))?;

                if !todos_differ_on_key_fields(&local, &remote) || local.updated_at.timestamp_millis() <= remote_timestamp.timestamp_millis() {
                    self.storage.upsert_todo(&remote, true).await.map_err(SyncError::Domain)?;
                    return Ok(true);
                }

                match self.conflict_strategy {
                    ConflictStrategy::Local => Ok(false),
                    ConflictStrategy::Remote => {
                        self.storage.upsert_todo(&remote, true).await.map_err(SyncError::Domain)?;
                        Ok(true)
                    }
                    ConflictStrategy::Ask => Err(SyncError::UserInterventionRequired(SyncConflict {
                        file_id: sync_id.to_string(),
                        file_kind: "todo".to_string(),
                        file_name: local.content.clone(),
                        local_time: local.updated_at.timestamp_millis(),
                        remote_time: remote_timestamp.timestamp_millis(),
                        message: "concurrent update".to_string(),
                    })),
                }
            }
            ChangeOperation::Delete => {
                let Some(local) = self.storage.get_todo(sync_id, true).await.map_err(SyncError::Domain)? else {
                    return Ok(false);
                };
                if local.updated_at > remote_timestamp {
                    return Err(SyncError::UserInterventionRequired(SyncConflict {
                        file_id: sync_id.to_string(),
                        file_kind: "todo".to_string(),
                        file_name: local.content.clone(),
                        local_time: local.updated_at.timestamp_millis(),
                        remote_time: remote_timestamp.timestamp_millis(),
                        message: "delete-update-conflict".to_string(),
                    }));
                }
                self.storage.soft_delete_todo(sync_id, true).await.map_err(SyncError::Domain)?;
                Ok(true)
            }
            ChangeOperation::Restore => {
                let Some(local) = self.storage.get_todo(sync_id, true).await.map_err(SyncError::Domain)? else {
                    return Ok(false);
                };
                if !local.is_deleted {
                    return Ok(false);
                }
                if local.deleted_at.map(|d| d > remote_timestamp).unwrap_or(false) {
                    return Err(SyncError::UserInterventionRequired(SyncConflict {
                        file_id: sync_id.to_string(),
                        file_kind: "todo".to_string(),
                        file_name: local.content.clone(),
                        local_time: local.deleted_at.map(|d| d.timestamp_millis()).unwrap_or_default(),
                        remote_time: remote_timestamp.timestamp_millis(),
                        message: "restore-delete-conflict".to_string(),
                    }));
                }
                let mut restored = local;
                restored.is_deleted = false;
                restored.deleted_at = None;
                self.storage.upsert_todo(&restored, true).await.map_err(SyncError::Domain)?;
                Ok(true)
            }
        }
    }

    /// Update-vs-update conflict: this transport has no `version_history`
    /// support, so the three-way merge base is always absent and the
    /// conflict escalates straight to user intervention (or the
    /// configured non-`ask` strategy / last-writer-wins fallback).
    async fn resolve_note_conflict(&self, local: Note, remote: Note, remote_timestamp: DateTime<Utc>) -> SyncResult<bool> {
        match self.conflict_strategy {
            ConflictStrategy::Local => Ok(false),
            ConflictStrategy::Remote => {
                self.storage.upsert_note(&remote, true).await.map_err(SyncError::Domain)?;
                Ok(true)
            }
            ConflictStrategy::Ask => Err(SyncError::UserInterventionRequired(SyncConflict {
                file_id: local.sync_id.to_string(),
                file_kind: "note".to_string(),
                file_name: local.title.clone(),
                local_time: local.updated_at.timestamp_millis(),
                remote_time: remote_timestamp.timestamp_millis(),
                message: "concurrent update".to_string(),
            })),
        }
    }
}

fn to_change_record(entry: &ChangeLogEntry) -> ChangeRecord {
    ChangeRecord {
        id: entry.id,
        entity_id: entry.entity_id.to_string(),
        operation: entry.operation.as_str().to_string(),
        change_data: entry.payload.clone(),
        timestamp: entry.created_at.to_rfc3339(),
    }
}

fn parse_change_filename(file_name: &str) -> Option<(EntityType, i64)> {
    let stem = file_name.strip_prefix("changes-")?.strip_suffix(".json")?;
    let mut parts = stem.rsplitn(3, '-');
    let ts: i64 = parts.next()?.parse().ok()?;
    let _device = parts.next()?;
    let entity_type_str = parts.next()?;
    let entity_type = EntityType::from_str(entity_type_str)?;
    Some((entity_type, ts))
}

fn notes_differ_on_key_fields(a: &Note, b: &Note) -> bool {
    a.body != b.body || a.title != b.title || a.tags != b.tags || a.is_deleted != b.is_deleted
}

fn todos_differ_on_key_fields(a: &Todo, b: &Todo) -> bool {
    a.content != b.content || a.is_completed != b.is_completed || a.is_deleted != b.is_deleted
}

/// Exposes the new-entity construction a caller uses before logging a
/// locally-originated change, kept here so `NewChange` stays a pure DTO.
pub fn new_change(entity_type: EntityType, entity_id: Uuid, operation: ChangeOperation, payload: Option<Value>, device_id: Option<Uuid>) -> NewChange {
    NewChange { entity_type, entity_id, operation, payload, device_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::storage::repository::{SqliteNoteRepository, SqliteSettingRepository, SqliteTodoRepository};
    use crate::domains::sync::change_log::SqliteChangeLogRepository;

    #[test]
    fn parses_change_filename() {
        let (entity_type, ts) = parse_change_filename("changes-note-abcd1234-1700000000000.json").unwrap();
        assert_eq!(entity_type, EntityType::Note);
        assert_eq!(ts, 1700000000000);
    }

    #[test]
    fn rejects_malformed_filename() {
        assert!(parse_change_filename("manifest.json").is_none());
    }

    #[test]
    fn notes_differing_only_by_timestamp_are_not_key_field_changes() {
        let a = sample_note();
        let mut b = a.clone();
        b.updated_at = a.updated_at + chrono::Duration::seconds(5);
        assert!(!notes_differ_on_key_fields(&a, &b));
    }

    #[test]
    fn notes_differing_in_body_are_key_field_changes() {
        let a = sample_note();
        let mut b = a.clone();
        b.body = "changed".to_string();
        assert!(notes_differ_on_key_fields(&a, &b));
    }

    fn sample_note() -> Note {
        Note {
            sync_id: Uuid::new_v4(),
            title: "Title".to_string(),
            body: "body".to_string(),
            kind: crate::domains::storage::NoteKind::Markdown,
            tags: String::new(),
            category: String::new(),
            pinned: false,
            favorite: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_deleted: false,
            deleted_at: None,
        }
    }

    async fn build_test_legacy() -> (LegacyIncrementalSync, tempfile::TempDir) {
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
        let change_log: Arc<dyn ChangeLogRepository> = Arc::new(SqliteChangeLogRepository::new(pool.clone()));

        // Points nowhere reachable; the tests below never let it perform I/O.
        let transport = Arc::new(WebDavClient::new("http://127.0.0.1:9/unused", "user", "pass", 1, 0, 1));
        let device = DeviceContext::new(Uuid::new_v4(), false);

        let legacy = LegacyIncrementalSync::new(storage, change_log, transport, "/FlashNote/".to_string(), device, ConflictStrategy::Ask, dir.path());
        (legacy, dir)
    }

    #[tokio::test]
    async fn stop_sets_should_stop() {
        let (legacy, _dir) = build_test_legacy().await;
        assert!(!legacy.should_stop());
        legacy.stop();
        assert!(legacy.should_stop());
    }

    #[tokio::test]
    async fn apply_note_change_creates_local_note_from_payload() {
        let (legacy, _dir) = build_test_legacy().await;
        let note = sample_note();
        let sync_id = note.sync_id;
        let payload = serde_json::to_value(&note).unwrap();

        let applied = legacy.apply_note_change(sync_id, ChangeOperation::Create, Some(&payload), Utc::now()).await.unwrap();
        assert!(applied);

        let stored = legacy.storage.get_note(sync_id, true).await.unwrap();
        assert_eq!(stored.unwrap().title, "Title");
    }

    #[tokio::test]
    async fn apply_note_change_delete_with_no_local_note_is_a_no_op() {
        let (legacy, _dir) = build_test_legacy().await;
        let applied = legacy.apply_note_change(Uuid::new_v4(), ChangeOperation::Delete, None, Utc::now()).await.unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn apply_note_change_update_applies_when_local_is_older() {
        let (legacy, _dir) = build_test_legacy().await;
        let mut note = sample_note();
        legacy.storage.upsert_note(&note, true).await.unwrap();

        note.body = "new body".to_string();
        let future = Utc::now() + chrono::Duration::seconds(60);
        let payload = serde_json::to_value(&note).unwrap();

        let applied = legacy.apply_note_change(note.sync_id, ChangeOperation::Update, Some(&payload), future).await.unwrap();
        assert!(applied);

        let stored = legacy.storage.get_note(note.sync_id, true).await.unwrap().unwrap();
        assert_eq!(stored.body, "new body");
    }
}
