pub mod storage;
pub mod sync;

pub use storage::StorageAdapter;
pub use sync::change_log::{ChangeLogRepository, SqliteChangeLogRepository};
