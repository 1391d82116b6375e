//! Pure decisions behind a sync pass: what to push for a dirty note, how a
//! server acknowledgment lands on the local row, and how a fresh remote
//! listing is reconciled with the local note set.

use std::collections::{HashMap, HashSet};

use crate::models::{DirtyState, Note, NoteDraft, NoteId, RemoteId, RemoteNote};

/// Remote call (if any) needed to push one local note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAction {
    /// Nothing pending.
    Skip,
    /// Upload a note the server has never seen.
    Create(NoteDraft),
    /// Overwrite the server copy, conditionally when an etag is known.
    Update {
        remote_id: RemoteId,
        draft: NoteDraft,
        etag: Option<String>,
    },
    /// Remove the server copy, then purge the local row.
    Delete(RemoteId),
    /// The note was created and deleted locally without ever reaching the
    /// server. Purge the row, no remote call.
    Rollback,
}

impl PushAction {
    /// Whether the action needs a round trip to the remote service.
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Create(_) | Self::Update { .. } | Self::Delete(_)
        )
    }
}

/// Decide how to push `note`.
///
/// An edited note that never received a remote id is uploaded as a create.
#[must_use]
pub fn push_action(note: &Note) -> PushAction {
    match (note.dirty, note.remote_id) {
        (DirtyState::Unchanged, _) => PushAction::Skip,
        (DirtyState::LocallyDeleted, Some(remote_id)) => PushAction::Delete(remote_id),
        (DirtyState::LocallyDeleted, None) => PushAction::Rollback,
        (DirtyState::LocallyCreated | DirtyState::LocallyEdited, None) => {
            PushAction::Create(note.draft())
        }
        (DirtyState::LocallyCreated | DirtyState::LocallyEdited, Some(remote_id)) => {
            PushAction::Update {
                remote_id,
                draft: note.draft(),
                etag: note.etag.clone(),
            }
        }
    }
}

/// What happened when a remote acknowledgment was applied to a local row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The row now mirrors the remote copy and is `Unchanged`.
    Applied,
    /// The row changed locally while the push was in flight. Only the remote
    /// id and etag were recorded; the row stays dirty for the next pass.
    Superseded,
    /// The row no longer exists.
    Missing,
}

/// Fold the server's copy of a pushed note into the local row.
///
/// The local id never changes, the remote id and etag are always adopted.
/// Content is only overwritten when the row is still at `expected_revision`,
/// the revision the push was built from; otherwise the newer local edit is
/// kept and a note that was pending creation becomes a pending edit.
pub fn apply_acknowledgment(
    note: &mut Note,
    expected_revision: i64,
    remote: &RemoteNote,
) -> AckOutcome {
    note.remote_id = Some(remote.remote_id);
    note.etag.clone_from(&remote.etag);

    if note.revision != expected_revision {
        if note.dirty == DirtyState::LocallyCreated {
            note.dirty = DirtyState::LocallyEdited;
        }
        return AckOutcome::Superseded;
    }

    note.title.clone_from(&remote.title);
    note.content.clone_from(&remote.content);
    note.category.clone_from(&remote.category);
    note.favorite = remote.favorite;
    note.modified = remote.modified;
    note.dirty = DirtyState::Unchanged;
    AckOutcome::Applied
}

/// Local mutations needed to converge on a remote listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Remote notes with no local row yet.
    pub adopt: Vec<RemoteNote>,
    /// Remote notes whose clean local row is out of date.
    pub refresh: Vec<RemoteNote>,
    /// Clean local rows whose remote copy disappeared.
    pub stale: Vec<NoteId>,
    /// Dirty local rows left alone regardless of the listing.
    pub skipped_dirty: usize,
    remote_ids: Vec<RemoteId>,
}

impl ReconcilePlan {
    /// Every remote id of the listing, the keep-set for stale detection.
    pub fn remote_ids(&self) -> &[RemoteId] {
        &self.remote_ids
    }

    pub fn is_noop(&self) -> bool {
        self.adopt.is_empty() && self.refresh.is_empty() && self.stale.is_empty()
    }
}

/// Compare the post-push local notes against a fresh remote listing.
///
/// Rows with a pending local change are the source of truth until their own
/// push resolves them and are never scheduled for refresh or removal.
#[must_use]
pub fn plan_reconciliation(local: &[Note], remote: &[RemoteNote]) -> ReconcilePlan {
    let by_remote_id = local
        .iter()
        .filter_map(|note| note.remote_id.map(|remote_id| (remote_id, note)))
        .collect::<HashMap<_, _>>();
    let listed = remote
        .iter()
        .map(|note| note.remote_id)
        .collect::<HashSet<_>>();

    let mut plan = ReconcilePlan {
        remote_ids: remote.iter().map(|note| note.remote_id).collect(),
        ..ReconcilePlan::default()
    };

    for remote_note in remote {
        match by_remote_id.get(&remote_note.remote_id) {
            None => plan.adopt.push(remote_note.clone()),
            Some(local) if local.dirty.is_dirty() => {}
            Some(local) if !mirrors(local, remote_note) => plan.refresh.push(remote_note.clone()),
            Some(_) => {}
        }
    }

    for note in local {
        if note.dirty.is_dirty() {
            plan.skipped_dirty += 1;
            continue;
        }
        if note
            .remote_id
            .is_some_and(|remote_id| !listed.contains(&remote_id))
        {
            plan.stale.push(note.id);
        }
    }

    plan
}

fn mirrors(local: &Note, remote: &RemoteNote) -> bool {
    local.etag == remote.etag
        && local.title == remote.title
        && local.content == remote.content
        && local.category == remote.category
        && local.favorite == remote.favorite
        && local.modified == remote.modified
}
