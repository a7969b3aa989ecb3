pub mod adapter;
pub mod repository;
pub mod types;

pub use adapter::StorageAdapter;
pub use repository::{
    NoteRepository, SettingRepository, SqliteNoteRepository, SqliteSettingRepository, SqliteTodoRepository, TodoRepository,
};
pub use types::{Note, NoteKind, Todo};
