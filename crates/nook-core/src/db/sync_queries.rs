//! Sync bookkeeping queries used by the engine's push and pull phases

use std::collections::HashSet;

use rusqlite::params;

use super::repository::{SqliteNoteRepository, NOTE_COLUMNS};
use crate::error::Result;
use crate::models::{DirtyState, Note, NoteId, RemoteId, RemoteNote};
use crate::sync::{apply_acknowledgment, AckOutcome};

impl SqliteNoteRepository<'_> {
    /// Rows in the given dirty state, oldest modification first
    pub fn notes_by_dirty_state(&self, state: DirtyState) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE account = ? AND dirty_state = ?
             ORDER BY modified ASC"
        ))?;
        let notes = stmt
            .query_map(params![self.account, state.as_str()], Self::parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Every row of the account, pending deletions included
    pub fn all_notes(&self) -> Result<Vec<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE account = ?"))?;
        let notes = stmt
            .query_map(params![self.account], Self::parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Swap a locally created placeholder for the note the server created.
    ///
    /// The local id is kept so callers holding it stay valid; any stale clean
    /// row already carrying the same remote id is dropped to keep the
    /// (account, remote id) pair unique.
    pub fn replace(
        &self,
        old_id: &NoteId,
        expected_revision: i64,
        remote: &RemoteNote,
    ) -> Result<AckOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        self.conn.execute(
            "DELETE FROM notes
             WHERE account = ? AND remote_id = ? AND id != ? AND dirty_state = 'unchanged'",
            params![self.account, remote.remote_id.0, old_id.as_str()],
        )?;
        let outcome = self.acknowledge(old_id, expected_revision, remote)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Record a confirmed update: overwrite the row with the server copy and
    /// flip it back to `Unchanged`, unless it was edited again meanwhile.
    pub fn mark_unchanged(
        &self,
        id: &NoteId,
        expected_revision: i64,
        remote: &RemoteNote,
    ) -> Result<AckOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let outcome = self.acknowledge(id, expected_revision, remote)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn acknowledge(
        &self,
        id: &NoteId,
        expected_revision: i64,
        remote: &RemoteNote,
    ) -> Result<AckOutcome> {
        let Some(mut note) = self.get_any(id)? else {
            return Ok(AckOutcome::Missing);
        };

        let outcome = apply_acknowledgment(&mut note, expected_revision, remote);
        self.write(&note)?;
        Ok(outcome)
    }

    /// Remove a row outright
    pub fn purge(&self, id: &NoteId) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM notes WHERE id = ? AND account = ?",
            params![id.as_str(), self.account],
        )?;
        Ok(rows > 0)
    }

    /// Drop the stored etag so the next update is sent unconditionally
    pub fn forget_etag(&self, id: &NoteId) -> Result<()> {
        self.conn.execute(
            "UPDATE notes SET etag = NULL WHERE id = ? AND account = ?",
            params![id.as_str(), self.account],
        )?;
        Ok(())
    }

    /// Insert unknown remote notes as `Unchanged` and refresh rows that have no
    /// pending local change. Dirty rows are never touched.
    pub fn upsert_from_remote(&self, notes: &[RemoteNote]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut affected = 0;
        {
            let mut stmt = self.conn.prepare(
                "INSERT INTO notes (
                     account, id, remote_id, etag, title, content, category, favorite,
                     modified, dirty_state, revision
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'unchanged', 0)
                 ON CONFLICT(account, remote_id) DO UPDATE SET
                     etag = excluded.etag,
                     title = excluded.title,
                     content = excluded.content,
                     category = excluded.category,
                     favorite = excluded.favorite,
                     modified = excluded.modified
                 WHERE notes.dirty_state = 'unchanged'
                   AND (notes.etag IS NOT excluded.etag
                        OR notes.title != excluded.title
                        OR notes.content != excluded.content
                        OR notes.category IS NOT excluded.category
                        OR notes.favorite != excluded.favorite
                        OR notes.modified != excluded.modified)",
            )?;

            for remote in notes {
                affected += stmt.execute(params![
                    self.account,
                    NoteId::new().as_str(),
                    remote.remote_id.0,
                    remote.etag,
                    remote.title,
                    remote.content,
                    remote.category,
                    remote.favorite,
                    remote.modified,
                ])?;
            }
        }
        tx.commit()?;
        Ok(affected)
    }

    /// Delete `Unchanged` rows whose remote id is not in `remote_ids`.
    ///
    /// Returns the local ids that were removed.
    pub fn delete_where_remote_id_missing(&self, remote_ids: &[RemoteId]) -> Result<Vec<NoteId>> {
        let keep = remote_ids.iter().copied().collect::<HashSet<_>>();

        let tx = self.conn.unchecked_transaction()?;
        let stale = self
            .notes_by_dirty_state(DirtyState::Unchanged)?
            .into_iter()
            .filter(|note| note.remote_id.is_some_and(|remote_id| !keep.contains(&remote_id)))
            .map(|note| note.id)
            .collect::<Vec<_>>();

        for id in &stale {
            self.purge(id)?;
        }
        tx.commit()?;
        Ok(stale)
    }
}
