#![recursion_limit = "512"]

// Public modules
pub mod config;
pub mod context;
pub mod domains;
pub mod errors;
pub mod globals;
pub mod transport;

// Private modules
mod db_migration;

use uuid::Uuid;

use crate::config::SyncConfig;
use crate::domains::sync::orchestrator::{SyncMode, SyncOutcome};
use crate::errors::{ServiceResult, SyncResult};

/// Initializes every process-wide singleton: opens the SQLite pool, applies
/// migrations, and wires the storage adapter, WebDAV transport, and both
/// sync engines. Must be called once before any other function here.
pub async fn initialize(
    db_url: &str,
    device_id: Uuid,
    offline_mode: bool,
    data_dir: &str,
    sync_config: SyncConfig,
    mode: SyncMode,
) -> ServiceResult<()> {
    globals::initialize(db_url, device_id, offline_mode, data_dir, sync_config, mode).await
}

/// Set offline mode status.
pub fn set_offline_mode(offline_mode: bool) {
    globals::set_offline_mode(offline_mode);
}

/// Get the current device ID.
pub fn get_device_id() -> ServiceResult<Uuid> {
    globals::get_device_id()
}

/// Check if the app is in offline mode.
pub fn is_offline_mode() -> bool {
    globals::is_offline_mode()
}

/// Runs one sync pass with the mode the process was initialized with
/// (manifest engine or legacy incremental protocol).
pub async fn sync_now() -> SyncResult<SyncOutcome> {
    let orchestrator = globals::get_orchestrator()
        .map_err(|e| crate::errors::SyncError::Domain(crate::errors::DomainError::Internal(e.to_string())))?;
    orchestrator.perform_sync().await
}

/// Forces a clean-slate bootstrap: wipes the remote and local manifests and
/// re-uploads everything, regardless of sync mode.
pub async fn force_full_sync() -> SyncResult<SyncOutcome> {
    let orchestrator = globals::get_orchestrator()
        .map_err(|e| crate::errors::SyncError::Domain(crate::errors::DomainError::Internal(e.to_string())))?;
    orchestrator.force_full_sync().await
}

/// Halts the in-progress sync (if any) at the next batch boundary.
pub fn stop_sync() -> ServiceResult<()> {
    let orchestrator = globals::get_orchestrator()?;
    orchestrator.stop();
    Ok(())
}

/// Subscribes to the orchestrator's sync event stream (progress, conflicts,
/// completion). Each call returns an independent receiver.
pub fn subscribe_sync_events() -> ServiceResult<tokio::sync::broadcast::Receiver<crate::domains::sync::SyncEvent>> {
    Ok(globals::get_orchestrator()?.subscribe())
}
