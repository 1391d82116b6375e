//! Database layer for nook

mod connection;
mod migrations;
mod repository;
mod settings_repository;
mod store;
mod sync_queries;

pub use connection::Database;
pub use repository::{DirtyCounts, NoteRepository, SqliteNoteRepository};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
pub use store::NoteStore;
