//! Note repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{DirtyState, Note, NoteDraft, NoteId, RemoteId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// Column list shared by every note query, in `parse_note` order.
pub(super) const NOTE_COLUMNS: &str =
    "id, remote_id, etag, title, content, category, favorite, modified, dirty_state, revision";

/// Number of notes waiting for the push phase, by dirty state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirtyCounts {
    pub created: usize,
    pub edited: usize,
    pub deleted: usize,
}

impl DirtyCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.created + self.edited + self.deleted
    }
}

/// Trait for user-facing note operations within one account
///
/// Every mutation marks the note dirty so the next sync pass uploads it.
/// Content queries never return notes that are pending deletion.
pub trait NoteRepository {
    /// Create a new, locally created note
    fn create(&self, draft: NoteDraft) -> Result<Note>;

    /// Get a note by ID
    fn get(&self, id: &NoteId) -> Result<Option<Note>>;

    /// List notes, favorites first, then most recently modified
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Note>>;

    /// List notes in a category or any of its sub-categories
    fn list_by_category(&self, category: &str, limit: usize, offset: usize) -> Result<Vec<Note>>;

    /// List favorite notes
    fn list_favorites(&self, limit: usize) -> Result<Vec<Note>>;

    /// Case-insensitive substring search on title and content
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Note>>;

    /// Replace a note's content, optionally retitling it
    fn update_content(&self, id: &NoteId, title: Option<&str>, content: &str) -> Result<Note>;

    /// Move a note to another category (`None` clears it)
    fn set_category(&self, id: &NoteId, category: Option<&str>) -> Result<Note>;

    /// Flip the favorite flag
    fn toggle_favorite(&self, id: &NoteId) -> Result<Note>;

    /// Mark a note for deletion
    fn delete(&self, id: &NoteId) -> Result<()>;

    /// Mark several notes for deletion, returning how many were found
    fn delete_many(&self, ids: &[NoteId]) -> Result<usize>;

    /// Resolve visible note IDs starting with `prefix`
    fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;

    /// Categories with their visible note counts
    fn categories(&self) -> Result<Vec<(String, usize)>>;

    /// Count notes waiting to be pushed
    fn dirty_counts(&self) -> Result<DirtyCounts>;
}

/// `SQLite` implementation of `NoteRepository`
pub struct SqliteNoteRepository<'a> {
    pub(super) conn: &'a Connection,
    pub(super) account: &'a str,
}

impl<'a> SqliteNoteRepository<'a> {
    /// Create a new repository scoped to `account`
    pub const fn new(conn: &'a Connection, account: &'a str) -> Self {
        Self { conn, account }
    }

    /// Parse a note from a database row
    pub(super) fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
        let id: String = row.get(0)?;
        let dirty: String = row.get(8)?;
        Ok(Note {
            id: id
                .parse()
                .map_err(|error| conversion_failure(0, Box::new(error)))?,
            remote_id: row.get::<_, Option<i64>>(1)?.map(RemoteId),
            etag: row.get(2)?,
            title: row.get(3)?,
            content: row.get(4)?,
            category: row.get(5)?,
            favorite: row.get(6)?,
            modified: row.get(7)?,
            dirty: dirty
                .parse()
                .map_err(|error: Error| conversion_failure(8, Box::new(error)))?,
            revision: row.get(9)?,
        })
    }

    /// Fetch a row in any dirty state, including pending deletions
    pub(super) fn get_any(&self, id: &NoteId) -> Result<Option<Note>> {
        let note = self
            .conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ? AND account = ?"),
                params![id.as_str(), self.account],
                Self::parse_note,
            )
            .optional()?;
        Ok(note)
    }

    /// Write every mutable column of `note` back to its row
    pub(super) fn write(&self, note: &Note) -> Result<()> {
        self.conn.execute(
            "UPDATE notes SET remote_id = ?, etag = ?, title = ?, content = ?, category = ?,
                 favorite = ?, modified = ?, dirty_state = ?, revision = ?
             WHERE id = ? AND account = ?",
            params![
                note.remote_id.map(|remote_id| remote_id.0),
                note.etag,
                note.title,
                note.content,
                note.category,
                note.favorite,
                note.modified,
                note.dirty.as_str(),
                note.revision,
                note.id.as_str(),
                self.account,
            ],
        )?;
        Ok(())
    }

    /// Insert a brand new row
    pub(super) fn insert(&self, note: &Note) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO notes (account, {NOTE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                self.account,
                note.id.as_str(),
                note.remote_id.map(|remote_id| remote_id.0),
                note.etag,
                note.title,
                note.content,
                note.category,
                note.favorite,
                note.modified,
                note.dirty.as_str(),
                note.revision,
            ],
        )?;
        Ok(())
    }

    fn query_notes(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(sql)?;
        let notes = stmt
            .query_map(params, Self::parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Apply a local change in one transaction and mark the note dirty
    fn mutate(&self, id: &NoteId, change: impl FnOnce(&mut Note)) -> Result<Note> {
        let tx = self.conn.unchecked_transaction()?;
        let mut note = self
            .get_any(id)?
            .filter(|note| note.dirty != DirtyState::LocallyDeleted)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        change(&mut note);
        note.dirty = note.dirty.after_local_edit();
        note.modified = crate::util::unix_millis_now().max(note.modified);
        note.revision += 1;

        self.write(&note)?;
        tx.commit()?;
        Ok(note)
    }
}

fn conversion_failure(
    column: usize,
    error: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, error)
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn create(&self, draft: NoteDraft) -> Result<Note> {
        if draft.content.trim().is_empty() && draft.title.trim().is_empty() {
            return Err(Error::InvalidInput("Note content cannot be empty".into()));
        }

        let note = Note::new_local(draft);
        self.insert(&note)?;
        tracing::debug!(note_id = %note.id, "Created local note");
        Ok(note)
    }

    fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        Ok(self
            .get_any(id)?
            .filter(|note| note.dirty != DirtyState::LocallyDeleted))
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS}
                 FROM notes
                 WHERE account = ? AND dirty_state != 'locally_deleted'
                 ORDER BY favorite DESC, modified DESC
                 LIMIT ? OFFSET ?"
            ),
            params![self.account, limit as i64, offset as i64],
        )
    }

    fn list_by_category(&self, category: &str, limit: usize, offset: usize) -> Result<Vec<Note>> {
        let category = category.trim_end_matches('/');
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS}
                 FROM notes
                 WHERE account = ? AND dirty_state != 'locally_deleted'
                   AND (category = ?2 OR category LIKE ?2 || '/%')
                 ORDER BY favorite DESC, modified DESC
                 LIMIT ? OFFSET ?"
            ),
            params![self.account, category, limit as i64, offset as i64],
        )
    }

    fn list_favorites(&self, limit: usize) -> Result<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS}
                 FROM notes
                 WHERE account = ? AND favorite = 1 AND dirty_state != 'locally_deleted'
                 ORDER BY modified DESC
                 LIMIT ?"
            ),
            params![self.account, limit as i64],
        )
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<Note>> {
        if query.trim().is_empty() {
            return self.list(limit, 0);
        }

        let pattern = format!("%{}%", query.trim());
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS}
                 FROM notes
                 WHERE account = ? AND dirty_state != 'locally_deleted'
                   AND (title LIKE ?2 OR content LIKE ?2)
                 ORDER BY modified DESC
                 LIMIT ?"
            ),
            params![self.account, pattern, limit as i64],
        )
    }

    fn update_content(&self, id: &NoteId, title: Option<&str>, content: &str) -> Result<Note> {
        self.mutate(id, |note| {
            note.content = content.to_string();
            if let Some(title) = title.map(str::trim).filter(|title| !title.is_empty()) {
                note.title = title.to_string();
            } else {
                note.title = crate::models::derive_title(content);
            }
        })
    }

    fn set_category(&self, id: &NoteId, category: Option<&str>) -> Result<Note> {
        self.mutate(id, |note| {
            note.category = category.map(str::to_string);
        })
    }

    fn toggle_favorite(&self, id: &NoteId) -> Result<Note> {
        self.mutate(id, |note| note.favorite = !note.favorite)
    }

    fn delete(&self, id: &NoteId) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE notes SET dirty_state = 'locally_deleted', revision = revision + 1
             WHERE id = ? AND account = ? AND dirty_state != 'locally_deleted'",
            params![id.as_str(), self.account],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        tracing::debug!(note_id = %id, "Marked note for deletion");
        Ok(())
    }

    fn delete_many(&self, ids: &[NoteId]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0;
        for id in ids {
            match self.delete(id) {
                Ok(()) => deleted += 1,
                Err(Error::NotFound(_)) => {}
                Err(error) => return Err(error),
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM notes
             WHERE account = ? AND dirty_state != 'locally_deleted' AND id LIKE ? || '%'
             ORDER BY modified DESC
             LIMIT ?",
        )?;
        let ids = stmt
            .query_map(params![self.account, prefix, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn categories(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) AS count
             FROM notes
             WHERE account = ? AND dirty_state != 'locally_deleted'
               AND category IS NOT NULL AND category != ''
             GROUP BY category
             ORDER BY category ASC",
        )?;

        let categories = stmt
            .query_map(params![self.account], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(categories)
    }

    fn dirty_counts(&self) -> Result<DirtyCounts> {
        let mut stmt = self.conn.prepare(
            "SELECT dirty_state, COUNT(*) FROM notes WHERE account = ? GROUP BY dirty_state",
        )?;
        let rows = stmt
            .query_map(params![self.account], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = DirtyCounts::default();
        for (state, count) in rows {
            match state.parse::<DirtyState>()? {
                DirtyState::LocallyCreated => counts.created = count,
                DirtyState::LocallyEdited => counts.edited = count,
                DirtyState::LocallyDeleted => counts.deleted = count,
                DirtyState::Unchanged => {}
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn clean(repo: &SqliteNoteRepository<'_>, note: &Note, remote_id: i64) {
        repo.conn
            .execute(
                "UPDATE notes SET dirty_state = 'unchanged', remote_id = ? WHERE id = ?",
                params![remote_id, note.id.as_str()],
            )
            .unwrap();
    }

    #[test]
    fn test_create_and_get() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        let note = repo.create(NoteDraft::from_content("Hello world")).unwrap();
        assert_eq!(note.dirty, DirtyState::LocallyCreated);

        let fetched = repo.get(&note.id).unwrap().unwrap();
        assert_eq!(fetched, note);
    }

    #[test]
    fn test_create_rejects_empty() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");
        assert!(matches!(
            repo.create(NoteDraft::from_content("   ")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_accounts_are_isolated() {
        let db = setup();
        let alice = SqliteNoteRepository::new(db.connection(), "alice");
        let bob = SqliteNoteRepository::new(db.connection(), "bob");

        let note = alice.create(NoteDraft::from_content("private")).unwrap();
        assert!(bob.get(&note.id).unwrap().is_none());
        assert!(bob.list(10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_list_orders_favorites_first() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        let plain = repo.create(NoteDraft::from_content("plain")).unwrap();
        let starred = repo
            .create(NoteDraft::from_content("starred").with_favorite(true))
            .unwrap();

        let notes = repo.list(10, 0).unwrap();
        let ids = notes.iter().map(|note| note.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![starred.id, plain.id]);
    }

    #[test]
    fn test_edit_marks_unchanged_note_edited() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        let note = repo.create(NoteDraft::from_content("Original")).unwrap();
        clean(&repo, &note, 1);

        let updated = repo.update_content(&note.id, None, "Updated\nbody").unwrap();
        assert_eq!(updated.title, "Updated");
        assert_eq!(updated.dirty, DirtyState::LocallyEdited);
        assert_eq!(updated.revision, note.revision + 1);
    }

    #[test]
    fn test_edit_keeps_created_state() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        let note = repo.create(NoteDraft::from_content("Original")).unwrap();
        let updated = repo.set_category(&note.id, Some("work/q3")).unwrap();
        assert_eq!(updated.dirty, DirtyState::LocallyCreated);
        assert_eq!(updated.category.as_deref(), Some("work/q3"));
    }

    #[test]
    fn test_toggle_favorite() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        let note = repo.create(NoteDraft::from_content("fav me")).unwrap();
        assert!(repo.toggle_favorite(&note.id).unwrap().favorite);
        assert!(!repo.toggle_favorite(&note.id).unwrap().favorite);
        assert_eq!(repo.list_favorites(10).unwrap().len(), 0);
    }

    #[test]
    fn test_delete_hides_but_keeps_row() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        let note = repo.create(NoteDraft::from_content("To delete")).unwrap();
        repo.delete(&note.id).unwrap();

        assert!(repo.get(&note.id).unwrap().is_none());
        assert!(repo.list(10, 0).unwrap().is_empty());
        assert!(repo.search("delete", 10).unwrap().is_empty());

        let row = repo.get_any(&note.id).unwrap().unwrap();
        assert_eq!(row.dirty, DirtyState::LocallyDeleted);

        assert!(matches!(repo.delete(&note.id), Err(Error::NotFound(_))));
        assert!(matches!(
            repo.update_content(&note.id, None, "revive"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_many_skips_unknown() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        let first = repo.create(NoteDraft::from_content("one")).unwrap();
        let second = repo.create(NoteDraft::from_content("two")).unwrap();

        let deleted = repo
            .delete_many(&[first.id, second.id, NoteId::new()])
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(repo.dirty_counts().unwrap().deleted, 2);
    }

    #[test]
    fn test_list_by_category_includes_subcategories() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        repo.create(NoteDraft::from_content("a").with_category(Some("work".into())))
            .unwrap();
        repo.create(NoteDraft::from_content("b").with_category(Some("work/q3".into())))
            .unwrap();
        repo.create(NoteDraft::from_content("c").with_category(Some("workshop".into())))
            .unwrap();

        assert_eq!(repo.list_by_category("work", 10, 0).unwrap().len(), 2);
        assert_eq!(repo.list_by_category("work/q3/", 10, 0).unwrap().len(), 1);

        let categories = repo.categories().unwrap();
        assert_eq!(
            categories,
            vec![
                ("work".to_string(), 1),
                ("work/q3".to_string(), 1),
                ("workshop".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_search() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        repo.create(NoteDraft::from_content("Hello world")).unwrap();
        repo.create(NoteDraft::from_content("Goodbye WORLD")).unwrap();
        repo.create(NoteDraft::from_content("Something else")).unwrap();

        assert_eq!(repo.search("world", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_prefix_lookup() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        let note = repo.create(NoteDraft::from_content("prefix")).unwrap();
        let prefix = note.id.as_str().chars().take(13).collect::<String>();
        assert_eq!(
            repo.list_ids_by_prefix(&prefix, 3).unwrap(),
            vec![note.id.as_str()]
        );
    }

    #[test]
    fn test_dirty_counts() {
        let db = setup();
        let repo = SqliteNoteRepository::new(db.connection(), "alice");

        repo.create(NoteDraft::from_content("new")).unwrap();
        let edited = repo.create(NoteDraft::from_content("edit me")).unwrap();
        clean(&repo, &edited, 9);
        repo.update_content(&edited.id, None, "edited").unwrap();

        assert_eq!(
            repo.dirty_counts().unwrap(),
            DirtyCounts {
                created: 1,
                edited: 1,
                deleted: 0
            }
        );
    }
}
