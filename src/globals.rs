//! Process-wide singletons, set up once via [`initialize`] and handed out
//! through `Arc` getters. Mirrors the teacher's lazy_static + `Once` gate,
//! trimmed to the handful of components the sync core actually needs.

use std::sync::{Arc, Mutex, Once};

use lazy_static::lazy_static;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::context::DeviceContext;
use crate::domains::storage::adapter::StorageAdapter;
use crate::domains::storage::repository::{SqliteNoteRepository, SqliteSettingRepository, SqliteTodoRepository};
use crate::domains::sync::assets::{AssetStore, FsAssetStore};
use crate::domains::sync::change_log::{ChangeLogRepository, SqliteChangeLogRepository};
use crate::domains::sync::engine::SyncEngine;
use crate::domains::sync::legacy::LegacyIncrementalSync;
use crate::domains::sync::orchestrator::{Orchestrator, SyncMode};
use crate::errors::{ServiceError, ServiceResult};
use crate::transport::WebDavClient;

lazy_static! {
    static ref DB_POOL: Mutex<Option<SqlitePool>> = Mutex::new(None);
    static ref DEVICE_ID: Mutex<Option<Uuid>> = Mutex::new(None);
    static ref OFFLINE_MODE: Mutex<bool> = Mutex::new(false);
    static ref DATA_DIR: Mutex<Option<String>> = Mutex::new(None);

    static ref CHANGE_LOG_REPO: Mutex<Option<Arc<dyn ChangeLogRepository>>> = Mutex::new(None);
    static ref STORAGE_ADAPTER: Mutex<Option<Arc<StorageAdapter>>> = Mutex::new(None);
    static ref ASSET_STORE: Mutex<Option<Arc<dyn AssetStore>>> = Mutex::new(None);
    static ref WEBDAV_CLIENT: Mutex<Option<Arc<WebDavClient>>> = Mutex::new(None);
    static ref SYNC_ENGINE: Mutex<Option<Arc<SyncEngine>>> = Mutex::new(None);
    static ref LEGACY_SYNC: Mutex<Option<Arc<LegacyIncrementalSync>>> = Mutex::new(None);
    static ref ORCHESTRATOR: Mutex<Option<Arc<Orchestrator>>> = Mutex::new(None);
}

static INIT: Once = Once::new();

/// Wires every singleton up from a database URL, the local device identity,
/// the data directory sync keeps its manifest/asset cache in, and the
/// remote WebDAV configuration. Idempotent: subsequent calls are no-ops.
pub async fn initialize(
    db_url: &str,
    device_id: Uuid,
    offline_mode: bool,
    data_dir: &str,
    sync_config: SyncConfig,
    mode: SyncMode,
) -> ServiceResult<()> {
    if INIT.is_completed() {
        return Ok(());
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_lazy(db_url)
        .map_err(|e| ServiceError::Configuration(format!("failed to open database pool: {}", e)))?;

    crate::db_migration::initialize_database(&pool)
        .await
        .map_err(|e| ServiceError::Configuration(format!("database migration failed: {}", e)))?;

    let change_log_repo: Arc<dyn ChangeLogRepository> = Arc::new(SqliteChangeLogRepository::new(pool.clone()));
    let notes = Arc::new(SqliteNoteRepository::new(pool.clone()));
    let todos = Arc::new(SqliteTodoRepository::new(pool.clone()));
    let settings = Arc::new(SqliteSettingRepository::new(pool.clone()));
    let storage_adapter = Arc::new(StorageAdapter::new(notes, todos, settings));

    let asset_store: Arc<dyn AssetStore> = Arc::new(FsAssetStore::new(format!("{}/assets", data_dir)));

    let webdav_client = Arc::new(WebDavClient::new(
        sync_config.base_url.clone(),
        sync_config.username.clone(),
        sync_config.password.clone(),
        sync_config.effective_concurrency(),
        sync_config.request_delay_ms,
        sync_config.retry_attempts,
    ));

    let device = DeviceContext::new(device_id, offline_mode);

    let sync_engine = Arc::new(SyncEngine::new(
        storage_adapter.clone(),
        webdav_client.clone(),
        sync_config.normalized_root(),
        device.clone(),
        sync_config.conflict_strategy,
        data_dir,
        asset_store.clone(),
    ));

    let legacy_sync = Arc::new(LegacyIncrementalSync::new(
        storage_adapter.clone(),
        change_log_repo.clone(),
        webdav_client.clone(),
        sync_config.normalized_root(),
        device,
        sync_config.conflict_strategy,
        data_dir,
    ));

    let orchestrator = Arc::new(Orchestrator::new(sync_engine.clone(), legacy_sync.clone(), mode));

    *DB_POOL.lock().map_err(|_| ServiceError::Configuration("DB_POOL lock poisoned".to_string()))? = Some(pool);
    *DEVICE_ID.lock().map_err(|_| ServiceError::Configuration("DEVICE_ID lock poisoned".to_string()))? = Some(device_id);
    *OFFLINE_MODE.lock().map_err(|_| ServiceError::Configuration("OFFLINE_MODE lock poisoned".to_string()))? = offline_mode;
    *DATA_DIR.lock().map_err(|_| ServiceError::Configuration("DATA_DIR lock poisoned".to_string()))? = Some(data_dir.to_string());
    *CHANGE_LOG_REPO.lock().map_err(|_| ServiceError::Configuration("CHANGE_LOG_REPO lock poisoned".to_string()))? = Some(change_log_repo);
    *STORAGE_ADAPTER.lock().map_err(|_| ServiceError::Configuration("STORAGE_ADAPTER lock poisoned".to_string()))? = Some(storage_adapter);
    *ASSET_STORE.lock().map_err(|_| ServiceError::Configuration("ASSET_STORE lock poisoned".to_string()))? = Some(asset_store);
    *WEBDAV_CLIENT.lock().map_err(|_| ServiceError::Configuration("WEBDAV_CLIENT lock poisoned".to_string()))? = Some(webdav_client);
    *SYNC_ENGINE.lock().map_err(|_| ServiceError::Configuration("SYNC_ENGINE lock poisoned".to_string()))? = Some(sync_engine);
    *LEGACY_SYNC.lock().map_err(|_| ServiceError::Configuration("LEGACY_SYNC lock poisoned".to_string()))? = Some(legacy_sync);
    *ORCHESTRATOR.lock().map_err(|_| ServiceError::Configuration("ORCHESTRATOR lock poisoned".to_string()))? = Some(orchestrator);

    INIT.call_once(|| {});

    Ok(())
}

fn get_or_uninitialized<T: Clone>(cell: &Mutex<Option<T>>, name: &str) -> ServiceResult<T> {
    cell.lock()
        .map_err(|_| ServiceError::Configuration(format!("{} lock poisoned", name)))?
        .clone()
        .ok_or_else(|| ServiceError::Configuration(format!("{} accessed before initialize()", name)))
}

pub fn get_db_pool() -> ServiceResult<SqlitePool> {
    get_or_uninitialized(&DB_POOL, "DB_POOL")
}

pub fn get_device_id() -> ServiceResult<Uuid> {
    get_or_uninitialized(&DEVICE_ID, "DEVICE_ID")
}

pub fn is_offline_mode() -> bool {
    *OFFLINE_MODE.lock().expect("OFFLINE_MODE lock poisoned")
}

pub fn set_offline_mode(offline: bool) {
    *OFFLINE_MODE.lock().expect("OFFLINE_MODE lock poisoned") = offline;
}

pub fn get_change_log_repo() -> ServiceResult<Arc<dyn ChangeLogRepository>> {
    get_or_uninitialized(&CHANGE_LOG_REPO, "CHANGE_LOG_REPO")
}

pub fn get_storage_adapter() -> ServiceResult<Arc<StorageAdapter>> {
    get_or_uninitialized(&STORAGE_ADAPTER, "STORAGE_ADAPTER")
}

pub fn get_webdav_client() -> ServiceResult<Arc<WebDavClient>> {
    get_or_uninitialized(&WEBDAV_CLIENT, "WEBDAV_CLIENT")
}

pub fn get_sync_engine() -> ServiceResult<Arc<SyncEngine>> {
    get_or_uninitialized(&SYNC_ENGINE, "SYNC_ENGINE")
}

pub fn get_legacy_sync() -> ServiceResult<Arc<LegacyIncrementalSync>> {
    get_or_uninitialized(&LEGACY_SYNC, "LEGACY_SYNC")
}

pub fn get_orchestrator() -> ServiceResult<Arc<Orchestrator>> {
    get_or_uninitialized(&ORCHESTRATOR, "ORCHESTRATOR")
}
