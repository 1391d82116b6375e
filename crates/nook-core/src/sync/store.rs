//! Local storage as seen by the sync engine.

use crate::db::NoteStore;
use crate::models::{DirtyState, Note, NoteId, RemoteId, RemoteNote};
use crate::Result;

use super::AckOutcome;

/// Storage operations the engine needs during push and pull.
///
/// Every mutation is atomic on its own; implementations never hold a lock
/// or transaction open between calls.
pub trait LocalStore: Clone + Send + Sync + 'static {
    /// Account whose notes this store exposes.
    fn account(&self) -> &str;

    fn notes_by_dirty_state(&self, state: DirtyState) -> Result<Vec<Note>>;

    /// Every row, pending deletions included.
    fn all_notes(&self) -> Result<Vec<Note>>;

    /// Record the server copy of a note pushed with `create`.
    fn replace(
        &self,
        old_id: &NoteId,
        expected_revision: i64,
        remote: &RemoteNote,
    ) -> Result<AckOutcome>;

    /// Record the server copy of a note pushed with `update`.
    fn mark_unchanged(
        &self,
        id: &NoteId,
        expected_revision: i64,
        remote: &RemoteNote,
    ) -> Result<AckOutcome>;

    fn purge(&self, id: &NoteId) -> Result<bool>;

    /// Make the next update of `id` unconditional.
    fn forget_etag(&self, id: &NoteId) -> Result<()>;

    /// Insert or refresh clean rows from the remote listing.
    fn upsert_from_remote(&self, notes: &[RemoteNote]) -> Result<usize>;

    /// Drop clean rows whose remote id is not listed.
    fn delete_where_remote_id_missing(&self, remote_ids: &[RemoteId]) -> Result<Vec<NoteId>>;
}

impl LocalStore for NoteStore {
    fn account(&self) -> &str {
        Self::account(self)
    }

    fn notes_by_dirty_state(&self, state: DirtyState) -> Result<Vec<Note>> {
        self.with_repo(|repo| repo.notes_by_dirty_state(state))
    }

    fn all_notes(&self) -> Result<Vec<Note>> {
        self.with_repo(|repo| repo.all_notes())
    }

    fn replace(
        &self,
        old_id: &NoteId,
        expected_revision: i64,
        remote: &RemoteNote,
    ) -> Result<AckOutcome> {
        self.with_repo(|repo| repo.replace(old_id, expected_revision, remote))
    }

    fn mark_unchanged(
        &self,
        id: &NoteId,
        expected_revision: i64,
        remote: &RemoteNote,
    ) -> Result<AckOutcome> {
        self.with_repo(|repo| repo.mark_unchanged(id, expected_revision, remote))
    }

    fn purge(&self, id: &NoteId) -> Result<bool> {
        self.with_repo(|repo| repo.purge(id))
    }

    fn forget_etag(&self, id: &NoteId) -> Result<()> {
        self.with_repo(|repo| repo.forget_etag(id))
    }

    fn upsert_from_remote(&self, notes: &[RemoteNote]) -> Result<usize> {
        if notes.is_empty() {
            return Ok(0);
        }
        self.with_repo(|repo| repo.upsert_from_remote(notes))
    }

    fn delete_where_remote_id_missing(&self, remote_ids: &[RemoteId]) -> Result<Vec<NoteId>> {
        self.with_repo(|repo| repo.delete_where_remote_id_missing(remote_ids))
    }
}
