//! Shared, account-scoped store handle used by clients and the sync engine.

use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{
    Database, DirtyCounts, NoteRepository, SettingsRepository, SqliteNoteRepository,
    SqliteSettingsRepository,
};
use crate::models::{Note, NoteDraft, NoteId, Settings};
use crate::Result;

/// Thread-safe handle to the local database, scoped to one account.
///
/// Cloning is cheap; clones share the same connection. Every call holds the
/// connection lock for one statement or one transaction and never across an
/// `.await`.
#[derive(Clone)]
pub struct NoteStore {
    db: Arc<Mutex<Database>>,
    account: Arc<str>,
}

impl NoteStore {
    /// Open the database at `path` for `account`, creating parent directories.
    pub fn open(path: impl AsRef<Path>, account: &str) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(path)?;
        tracing::debug!("Opened local store at {}", path.display());
        Ok(Self::from_database(db, account))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory(account: &str) -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?, account))
    }

    fn from_database(db: Database, account: &str) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            account: Arc::from(account),
        }
    }

    /// A handle for another account sharing the same database.
    #[must_use]
    pub fn for_account(&self, account: &str) -> Self {
        Self {
            db: Arc::clone(&self.db),
            account: Arc::from(account),
        }
    }

    /// Account this handle is scoped to.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Run `f` against a note repository while holding the connection lock.
    pub(crate) fn with_repo<T>(
        &self,
        f: impl FnOnce(&SqliteNoteRepository<'_>) -> Result<T>,
    ) -> Result<T> {
        let db = self.db.lock()?;
        let repo = SqliteNoteRepository::new(db.connection(), &self.account);
        f(&repo)
    }

    /// Create a new note.
    pub fn create_note(&self, draft: NoteDraft) -> Result<Note> {
        self.with_repo(|repo| repo.create(draft))
    }

    /// Fetch a visible note by id.
    pub fn get_note(&self, id: &NoteId) -> Result<Option<Note>> {
        self.with_repo(|repo| repo.get(id))
    }

    /// List visible notes.
    pub fn list_notes(&self, limit: usize, offset: usize) -> Result<Vec<Note>> {
        self.with_repo(|repo| repo.list(limit, offset))
    }

    /// List notes in a category subtree.
    pub fn list_notes_by_category(
        &self,
        category: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Note>> {
        self.with_repo(|repo| repo.list_by_category(category, limit, offset))
    }

    /// List favorite notes.
    pub fn list_favorites(&self, limit: usize) -> Result<Vec<Note>> {
        self.with_repo(|repo| repo.list_favorites(limit))
    }

    /// Search notes by title and content.
    pub fn search_notes(&self, query: &str, limit: usize) -> Result<Vec<Note>> {
        self.with_repo(|repo| repo.search(query, limit))
    }

    /// Replace a note's content.
    pub fn update_note(&self, id: &NoteId, title: Option<&str>, content: &str) -> Result<Note> {
        self.with_repo(|repo| repo.update_content(id, title, content))
    }

    /// Move a note to a category.
    pub fn set_category(&self, id: &NoteId, category: Option<&str>) -> Result<Note> {
        self.with_repo(|repo| repo.set_category(id, category))
    }

    /// Flip a note's favorite flag.
    pub fn toggle_favorite(&self, id: &NoteId) -> Result<Note> {
        self.with_repo(|repo| repo.toggle_favorite(id))
    }

    /// Mark a note for deletion.
    pub fn delete_note(&self, id: &NoteId) -> Result<()> {
        self.with_repo(|repo| repo.delete(id))
    }

    /// Mark several notes for deletion.
    pub fn delete_notes(&self, ids: &[NoteId]) -> Result<usize> {
        self.with_repo(|repo| repo.delete_many(ids))
    }

    /// Visible note ids starting with `prefix`.
    pub fn list_note_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        self.with_repo(|repo| repo.list_ids_by_prefix(prefix, limit))
    }

    /// Categories and note counts.
    pub fn categories(&self) -> Result<Vec<(String, usize)>> {
        self.with_repo(|repo| repo.categories())
    }

    /// Notes waiting for the next push.
    pub fn dirty_counts(&self) -> Result<DirtyCounts> {
        self.with_repo(|repo| repo.dirty_counts())
    }

    /// Load sync settings.
    pub fn load_settings(&self) -> Result<Settings> {
        let db = self.db.lock()?;
        SqliteSettingsRepository::new(db.connection()).load()
    }

    /// Save sync settings.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let db = self.db.lock()?;
        SqliteSettingsRepository::new(db.connection()).save(settings)
    }
}
