pub mod assets;
pub mod change_log;
pub mod conflict;
pub mod engine;
pub mod hash;
pub mod legacy;
pub mod manifest;
pub mod orchestrator;

pub use change_log::{ChangeLogEntry, ChangeLogRepository, ChangeOperation, EntityType, SqliteChangeLogRepository};
pub use conflict::{ConflictResolver, MergeOutcome};
pub use engine::{BootstrapOutcome, SyncEngine, SyncStatus};
pub use legacy::{IncrementalStatus, LegacyIncrementalSync};
pub use manifest::{FileEntry, SyncManifest};
pub use orchestrator::{Orchestrator, SyncEvent, SyncMode, SyncOutcome};
