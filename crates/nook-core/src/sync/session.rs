//! Sync engine: one push phase fanned out over a task group, a barrier, then
//! one pull and reconcile pass.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::gate::{GateRejection, Permit, SyncGate};
use super::policy::{plan_reconciliation, push_action, AckOutcome, PushAction};
use super::store::LocalStore;
use crate::models::{DirtyState, Note, NoteDraft, NoteId, RemoteId, RemoteNote};
use crate::remote::{RemoteClient, RemoteError};
use crate::state::SyncState;

/// Remote operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Download,
    /// The push phase as a whole, when no single note is at fault.
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or server outage; retried next pass.
    Transport,
    /// Unexpected response; the operation failed for this pass.
    Protocol,
    /// The remote copy moved on; the local copy is re-sent next pass.
    Conflict,
    /// The local store rejected the result.
    Storage,
    /// The operation task died before reporting.
    Aborted,
}

/// One operation that did not complete during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub operation: OperationKind,
    pub note: Option<NoteId>,
    pub kind: FailureKind,
    pub message: String,
}

impl SyncFailure {
    fn remote(operation: OperationKind, note: Option<NoteId>, error: &RemoteError) -> Self {
        let kind = match error {
            RemoteError::Transport(_) => FailureKind::Transport,
            RemoteError::Conflict(_) => FailureKind::Conflict,
            RemoteError::Protocol(_) | RemoteError::NotFound(_) => FailureKind::Protocol,
        };
        Self {
            operation,
            note,
            kind,
            message: error.to_string(),
        }
    }

    fn storage(operation: OperationKind, note: Option<NoteId>, error: &crate::Error) -> Self {
        Self {
            operation,
            note,
            kind: FailureKind::Storage,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.note {
            Some(note) => write!(formatter, "{:?} of note {note}: {}", self.operation, self.message),
            None => write!(formatter, "{:?}: {}", self.operation, self.message),
        }
    }
}

/// Aggregated outcome of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub success: bool,
    pub errors: Vec<SyncFailure>,
    /// The remote listing was applied to the local store.
    pub snapshot_applied: bool,
    /// Creates and updates acknowledged by the server.
    pub pushed: usize,
    /// Rows removed after a confirmed remote delete or a local-only rollback.
    pub purged: usize,
    pub inserted: usize,
    pub refreshed: usize,
    pub removed: usize,
    pub operations_dispatched: u64,
    pub operations_completed: u64,
}

/// Per-session operation counters.
///
/// Owned by the session and updated only from its own scope; the task group
/// decides when every push has settled, the counters report it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OperationTracker {
    dispatched: u64,
    completed: u64,
}

impl OperationTracker {
    pub fn dispatch(&mut self) {
        self.dispatched += 1;
    }

    pub fn complete(&mut self) {
        self.completed += 1;
    }

    pub const fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub const fn completed(&self) -> u64 {
        self.completed
    }

    pub const fn is_settled(&self) -> bool {
        self.dispatched == self.completed
    }
}

impl SyncResult {
    fn aborted(message: String) -> Self {
        Self {
            errors: vec![SyncFailure {
                operation: OperationKind::Push,
                note: None,
                kind: FailureKind::Aborted,
                message,
            }],
            ..Self::default()
        }
    }
}

type CompletionCallback = Arc<dyn Fn(&SyncResult) + Send + Sync>;

/// Runs sync sessions for one account.
pub struct SyncEngine<S, R> {
    store: S,
    remote: Arc<R>,
    gate: SyncGate,
    callbacks: Arc<Mutex<Vec<CompletionCallback>>>,
    state: Arc<watch::Sender<SyncState>>,
}

impl<S: LocalStore, R: RemoteClient> SyncEngine<S, R> {
    pub fn new(store: S, remote: R, gate: SyncGate) -> Self {
        Self::with_shared_remote(store, Arc::new(remote), gate)
    }

    /// Build an engine over a remote client shared with other engines.
    pub fn with_shared_remote(store: S, remote: Arc<R>, gate: SyncGate) -> Self {
        Self {
            store,
            remote,
            gate,
            callbacks: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(watch::Sender::new(SyncState::Idle)),
        }
    }

    pub fn account(&self) -> &str {
        self.store.account()
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn gate(&self) -> &SyncGate {
        &self.gate
    }

    /// Whether a session would be admitted right now. No side effect.
    pub fn permit(&self) -> Permit {
        self.gate.permit(self.account())
    }

    pub fn is_running(&self) -> bool {
        self.gate.is_running(self.account())
    }

    /// Current coarse state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Call `callback` every time a session finishes.
    ///
    /// Callbacks run once per session in registration order, after the
    /// account is released, so a callback may start another session.
    pub fn register_completion_callback(
        &self,
        callback: impl Fn(&SyncResult) + Send + Sync + 'static,
    ) {
        self.callbacks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Run one full sync pass.
    ///
    /// `Err` means the session was not attempted; a session that ran but had
    /// failing operations returns `Ok` with `success == false`.
    ///
    /// The pass runs on its own task: dropping the returned future stops the
    /// wait, not the pass. Dispatched operations always settle and their
    /// results reach the local store.
    pub async fn run(&self) -> Result<SyncResult, GateRejection> {
        let guard = match self.gate.acquire(self.account()) {
            Ok(guard) => guard,
            Err(rejection) => {
                tracing::warn!("Sync for {} not attempted: {rejection}", self.account());
                if rejection != GateRejection::AlreadyRunning {
                    self.state.send_replace(SyncState::Offline);
                }
                return Err(rejection);
            }
        };

        self.state.send_replace(SyncState::Syncing);
        let session = SyncSession::new(self.store.clone(), Arc::clone(&self.remote));
        let state = Arc::clone(&self.state);
        let callbacks = Arc::clone(&self.callbacks);

        let pass = tokio::spawn(async move {
            let result = session.run().await;
            drop(guard);

            state.send_replace(if result.success {
                SyncState::Synced
            } else {
                SyncState::Error
            });

            let callbacks = callbacks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone();
            for callback in &callbacks {
                callback(&result);
            }
            result
        });

        match pass.await {
            Ok(result) => Ok(result),
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(error) => {
                tracing::warn!("Sync pass for {} did not finish: {error}", self.account());
                Ok(SyncResult::aborted(error.to_string()))
            }
        }
    }
}

/// Effect of one settled push operation.
enum Pushed {
    Acknowledged,
    Purged,
    Skipped,
}

/// State of a single pass. Dropped when the pass ends.
struct SyncSession<S, R> {
    store: S,
    remote: Arc<R>,
    tracker: OperationTracker,
    result: SyncResult,
}

impl<S: LocalStore, R: RemoteClient> SyncSession<S, R> {
    fn new(store: S, remote: Arc<R>) -> Self {
        Self {
            store,
            remote,
            tracker: OperationTracker::default(),
            result: SyncResult::default(),
        }
    }

    async fn run(mut self) -> SyncResult {
        tracing::debug!("Starting sync session for {}", self.store.account());

        self.push().await;
        debug_assert!(self.tracker.is_settled());
        self.pull().await;

        self.result.operations_dispatched = self.tracker.dispatched();
        self.result.operations_completed = self.tracker.completed();
        self.result.success = self.result.errors.is_empty();

        let result = self.result;
        if result.success {
            tracing::info!(
                "Sync finished: {} pushed, {} purged, {} inserted, {} refreshed, {} removed",
                result.pushed,
                result.purged,
                result.inserted,
                result.refreshed,
                result.removed
            );
        } else {
            tracing::info!(
                "Sync finished with {} failed operation(s); {} pushed, {} purged",
                result.errors.len(),
                result.pushed,
                result.purged
            );
        }
        result
    }

    fn pending_notes(&self) -> crate::Result<Vec<Note>> {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for state in DirtyState::PENDING {
            for note in self.store.notes_by_dirty_state(state)? {
                if seen.insert(note.id) {
                    pending.push(note);
                }
            }
        }
        Ok(pending)
    }

    async fn push(&mut self) {
        let pending = match self.pending_notes() {
            Ok(pending) => pending,
            Err(error) => {
                tracing::warn!("Could not read pending notes: {error}");
                self.result
                    .errors
                    .push(SyncFailure::storage(OperationKind::Push, None, &error));
                return;
            }
        };

        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::new();
        for note in pending {
            match push_action(&note) {
                PushAction::Skip => {}
                PushAction::Rollback => match self.store.purge(&note.id) {
                    Ok(_) => {
                        tracing::debug!("Dropped local-only note {}", note.id);
                        self.result.purged += 1;
                    }
                    Err(error) => self.result.errors.push(SyncFailure::storage(
                        OperationKind::Delete,
                        Some(note.id),
                        &error,
                    )),
                },
                action => {
                    self.tracker.dispatch();
                    let operation = match &action {
                        PushAction::Create(_) => OperationKind::Create,
                        PushAction::Delete(_) => OperationKind::Delete,
                        _ => OperationKind::Update,
                    };
                    let note_id = note.id;
                    let store = self.store.clone();
                    let remote = Arc::clone(&self.remote);
                    let task = tasks.spawn(push_note(store, remote, note, action));
                    in_flight.insert(task.id(), (note_id, operation));
                }
            }
        }

        // Barrier: the pull must see every push result applied.
        while let Some(joined) = tasks.join_next_with_id().await {
            self.tracker.complete();
            match joined {
                Ok((task, pushed)) => {
                    in_flight.remove(&task);
                    match pushed {
                        Ok(Pushed::Acknowledged) => self.result.pushed += 1,
                        Ok(Pushed::Purged) => self.result.purged += 1,
                        Ok(Pushed::Skipped) => {}
                        Err(failure) => {
                            tracing::warn!("Push failed: {failure}");
                            self.result.errors.push(failure);
                        }
                    }
                }
                Err(error) => {
                    let owner = in_flight.remove(&error.id());
                    tracing::warn!("Push task aborted: {error}");
                    self.result.errors.push(SyncFailure {
                        operation: owner.map_or(OperationKind::Push, |(_, operation)| operation),
                        note: owner.map(|(note, _)| note),
                        kind: FailureKind::Aborted,
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    async fn pull(&mut self) {
        self.tracker.dispatch();
        let listed = self.remote.list().await;
        self.tracker.complete();

        let remote_notes = match listed {
            Ok(notes) => notes,
            Err(error) => {
                tracing::warn!("Download failed, local notes left untouched: {error}");
                self.result
                    .errors
                    .push(SyncFailure::remote(OperationKind::Download, None, &error));
                return;
            }
        };

        if let Err(error) = self.reconcile(&remote_notes) {
            tracing::warn!("Applying remote notes failed: {error}");
            self.result
                .errors
                .push(SyncFailure::storage(OperationKind::Download, None, &error));
        }
    }

    fn reconcile(&mut self, remote_notes: &[RemoteNote]) -> crate::Result<()> {
        let local = self.store.all_notes()?;
        let plan = plan_reconciliation(&local, remote_notes);
        tracing::debug!(
            "Reconciling {} remote notes: {} new, {} changed, {} gone, {} dirty kept",
            remote_notes.len(),
            plan.adopt.len(),
            plan.refresh.len(),
            plan.stale.len(),
            plan.skipped_dirty
        );

        self.result.inserted = self.store.upsert_from_remote(&plan.adopt)?;
        self.result.refreshed = self.store.upsert_from_remote(&plan.refresh)?;
        self.result.removed = self
            .store
            .delete_where_remote_id_missing(plan.remote_ids())?
            .len();
        self.result.snapshot_applied = true;
        Ok(())
    }
}

/// Push one note and apply the server's answer.
async fn push_note<S: LocalStore, R: RemoteClient>(
    store: S,
    remote: Arc<R>,
    note: Note,
    action: PushAction,
) -> Result<Pushed, SyncFailure> {
    let id = note.id;
    match action {
        PushAction::Create(draft) => create(&store, remote.as_ref(), &note, &draft).await,
        PushAction::Update {
            remote_id,
            draft,
            etag,
        } => {
            tracing::debug!("Updating note {id} (remote {remote_id})");
            match remote.update(remote_id, &draft, etag.as_deref()).await {
                Ok(server) => store
                    .mark_unchanged(&id, note.revision, &server)
                    .map(|_| Pushed::Acknowledged)
                    .map_err(|error| SyncFailure::storage(OperationKind::Update, Some(id), &error)),
                Err(RemoteError::NotFound(_)) => {
                    tracing::debug!("Remote note {remote_id} is gone, re-creating note {id}");
                    create(&store, remote.as_ref(), &note, &draft).await
                }
                Err(error @ RemoteError::Conflict(_)) => {
                    // Local wins: the next pass overwrites the remote copy.
                    if let Err(store_error) = store.forget_etag(&id) {
                        return Err(SyncFailure::storage(
                            OperationKind::Update,
                            Some(id),
                            &store_error,
                        ));
                    }
                    Err(SyncFailure::remote(OperationKind::Update, Some(id), &error))
                }
                Err(error) => Err(SyncFailure::remote(OperationKind::Update, Some(id), &error)),
            }
        }
        PushAction::Delete(remote_id) => delete(&store, remote.as_ref(), id, remote_id).await,
        PushAction::Skip | PushAction::Rollback => Ok(Pushed::Skipped),
    }
}

async fn create<S: LocalStore, R: RemoteClient>(
    store: &S,
    remote: &R,
    note: &Note,
    draft: &NoteDraft,
) -> Result<Pushed, SyncFailure> {
    tracing::debug!("Creating note {} remotely", note.id);
    let server = remote
        .create(draft)
        .await
        .map_err(|error| SyncFailure::remote(OperationKind::Create, Some(note.id), &error))?;

    let outcome = store
        .replace(&note.id, note.revision, &server)
        .map_err(|error| SyncFailure::storage(OperationKind::Create, Some(note.id), &error))?;
    if outcome == AckOutcome::Superseded {
        tracing::debug!(
            "Note {} changed during upload, kept for the next pass",
            note.id
        );
    }
    Ok(Pushed::Acknowledged)
}

async fn delete<S: LocalStore, R: RemoteClient>(
    store: &S,
    remote: &R,
    id: NoteId,
    remote_id: RemoteId,
) -> Result<Pushed, SyncFailure> {
    tracing::debug!("Deleting note {id} (remote {remote_id})");
    match remote.delete(remote_id).await {
        Ok(()) | Err(RemoteError::NotFound(_)) => store
            .purge(&id)
            .map(|_| Pushed::Purged)
            .map_err(|error| SyncFailure::storage(OperationKind::Delete, Some(id), &error)),
        Err(error) => Err(SyncFailure::remote(OperationKind::Delete, Some(id), &error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NoteStore;
    use crate::sync::testing::FakeRemote;
    use crate::sync::{NetworkStatus, StaticNetworkMonitor};
    use pretty_assertions::assert_eq;

    type Engine = SyncEngine<NoteStore, FakeRemote>;

    fn online_gate() -> SyncGate {
        SyncGate::new(Arc::new(StaticNetworkMonitor::online()))
    }

    fn engine_with(remote: FakeRemote) -> Arc<Engine> {
        let store = NoteStore::open_in_memory("alice").unwrap();
        Arc::new(SyncEngine::new(store, remote, online_gate()))
    }

    fn engine() -> Arc<Engine> {
        engine_with(FakeRemote::new())
    }

    fn all_notes(engine: &Engine) -> Vec<Note> {
        engine.store().all_notes().unwrap()
    }

    fn dirty_total(engine: &Engine) -> usize {
        engine.store().dirty_counts().unwrap().total()
    }

    fn clean_remote_note(engine: &Engine, remote_id: i64, content: &str) {
        let remote = RemoteNote {
            remote_id: RemoteId(remote_id),
            etag: Some("seed".to_string()),
            title: content.to_string(),
            content: content.to_string(),
            category: None,
            favorite: false,
            modified: 1_000,
        };
        engine
            .store()
            .upsert_from_remote(&[remote])
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_created_note_gets_remote_id() {
        let engine = engine();
        let note = engine
            .store()
            .create_note(NoteDraft::from_content("written offline"))
            .unwrap();

        let result = engine.run().await.unwrap();
        assert!(result.success);
        assert_eq!(result.pushed, 1);

        let stored = engine.store().get_note(&note.id).unwrap().unwrap();
        assert!(stored.remote_id.is_some());
        assert_eq!(stored.dirty, DirtyState::Unchanged);
        assert_eq!(all_notes(&engine).len(), 1);
        assert_eq!(engine.remote.notes().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clean_note_missing_remotely_is_removed() {
        let engine = engine();
        clean_remote_note(&engine, 42, "deleted elsewhere");

        let result = engine.run().await.unwrap();
        assert!(result.success);
        assert!(result.snapshot_applied);
        assert_eq!(result.removed, 1);
        assert!(all_notes(&engine).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn new_remote_note_is_inserted() {
        let remote = FakeRemote::new();
        let seeded = remote.seed("from another device");
        let engine = engine_with(remote);

        let result = engine.run().await.unwrap();
        assert_eq!(result.inserted, 1);

        let notes = all_notes(&engine);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].remote_id, Some(seeded.remote_id));
        assert_eq!(notes[0].dirty, DirtyState::Unchanged);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_edit_refreshes_clean_note() {
        let remote = FakeRemote::new();
        let seeded = remote.seed("v1");
        let engine = engine_with(remote);
        engine.run().await.unwrap();

        engine.remote.edit(seeded.remote_id, "v2");
        let result = engine.run().await.unwrap();
        assert_eq!(result.refreshed, 1);
        assert_eq!(all_notes(&engine)[0].content, "v2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_runs_converge() {
        let remote = FakeRemote::new();
        remote.seed("remote one");
        let engine = engine_with(remote);
        let store = engine.store();
        let created = store.create_note(NoteDraft::from_content("local one")).unwrap();
        store.create_note(NoteDraft::from_content("local two")).unwrap();

        engine.run().await.unwrap();
        store.update_note(&created.id, None, "local one, edited").unwrap();
        engine.run().await.unwrap();
        let before = all_notes(&engine);

        let result = engine.run().await.unwrap();
        assert!(result.success);
        assert_eq!(dirty_total(&engine), 0);
        assert_eq!(result.pushed + result.inserted + result.refreshed + result.removed, 0);
        assert_eq!(result.operations_dispatched, 1);

        let mut after = all_notes(&engine);
        let mut before = before;
        after.sort_by_key(|note| note.remote_id);
        before.sort_by_key(|note| note.remote_id);
        assert_eq!(after, before);
        assert_eq!(engine.remote.notes().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleted_note_is_purged_after_sync() {
        let engine = engine();
        let note = engine
            .store()
            .create_note(NoteDraft::from_content("short lived"))
            .unwrap();
        engine.run().await.unwrap();

        engine.store().delete_note(&note.id).unwrap();
        let result = engine.run().await.unwrap();
        assert!(result.success);
        assert_eq!(result.purged, 1);
        assert!(all_notes(&engine).is_empty());
        assert!(engine.remote.notes().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_of_already_gone_remote_note_succeeds() {
        let engine = engine();
        let note = engine
            .store()
            .create_note(NoteDraft::from_content("twice deleted"))
            .unwrap();
        engine.run().await.unwrap();
        let remote_id = engine.store().get_note(&note.id).unwrap().unwrap().remote_id.unwrap();

        engine.remote.remove(remote_id);
        engine.store().delete_note(&note.id).unwrap();

        let result = engine.run().await.unwrap();
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.purged, 1);
        assert!(all_notes(&engine).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_only_note_deleted_before_sync_never_reaches_remote() {
        let engine = engine();
        let note = engine
            .store()
            .create_note(NoteDraft::from_content("draft"))
            .unwrap();
        engine.store().delete_note(&note.id).unwrap();

        let result = engine.run().await.unwrap();
        assert_eq!(result.purged, 1);
        assert_eq!(result.operations_dispatched, 1);
        assert_eq!(engine.remote.calls(), 1);
        assert!(all_notes(&engine).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn partial_push_failure_reports_each_error() {
        let engine = engine();
        let store = engine.store();
        for index in 0..6 {
            store
                .create_note(NoteDraft::from_content(format!("note {index}")))
                .unwrap();
        }
        engine.remote.fail_content("note 1");
        engine.remote.fail_content("note 4");

        let result = engine.run().await.unwrap();
        assert!(!result.success);
        assert_eq!(result.errors.len(), 2);
        assert!(result
            .errors
            .iter()
            .all(|failure| failure.kind == FailureKind::Transport
                && failure.operation == OperationKind::Create));
        assert_eq!(result.pushed, 4);
        assert_eq!(result.operations_dispatched, 7);
        assert_eq!(result.operations_completed, 7);
        assert!(result.snapshot_applied);
        assert_eq!(store.dirty_counts().unwrap().created, 2);
        assert_eq!(all_notes(&engine).len(), 6);

        engine.remote.heal();
        let retried = engine.run().await.unwrap();
        assert!(retried.success);
        assert_eq!(retried.pushed, 2);
        assert_eq!(dirty_total(&engine), 0);
        assert_eq!(engine.remote.notes().len(), 6);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_delete_keeps_row_pending() {
        let engine = engine();
        let note = engine
            .store()
            .create_note(NoteDraft::from_content("sticky"))
            .unwrap();
        engine.run().await.unwrap();
        let remote_id = engine.store().get_note(&note.id).unwrap().unwrap().remote_id.unwrap();

        engine.store().delete_note(&note.id).unwrap();
        engine.remote.fail_delete(remote_id);
        let result = engine.run().await.unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].operation, OperationKind::Delete);
        assert_eq!(engine.store().dirty_counts().unwrap().deleted, 1);
        assert!(engine.store().get_note(&note.id).unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_download_leaves_store_untouched() {
        let engine = engine();
        clean_remote_note(&engine, 42, "would be removed");
        engine
            .store()
            .create_note(NoteDraft::from_content("pushed anyway"))
            .unwrap();
        engine
            .remote
            .fail_list(RemoteError::Transport("timed out".to_string()));

        let result = engine.run().await.unwrap();
        assert!(!result.success);
        assert!(!result.snapshot_applied);
        assert_eq!(result.pushed, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].operation, OperationKind::Download);
        assert_eq!(all_notes(&engine).len(), 2);
        assert_eq!(dirty_total(&engine), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_download_is_protocol_failure() {
        let engine = engine();
        clean_remote_note(&engine, 42, "kept");
        engine
            .remote
            .fail_list(RemoteError::Protocol("unexpected body".to_string()));

        let result = engine.run().await.unwrap();
        assert_eq!(result.errors[0].kind, FailureKind::Protocol);
        assert_eq!(all_notes(&engine).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflicting_edit_wins_on_next_pass() {
        let engine = engine();
        let note = engine
            .store()
            .create_note(NoteDraft::from_content("shared"))
            .unwrap();
        engine.run().await.unwrap();
        let remote_id = engine.store().get_note(&note.id).unwrap().unwrap().remote_id.unwrap();

        engine.remote.edit(remote_id, "edited on the server");
        engine
            .store()
            .update_note(&note.id, None, "edited locally")
            .unwrap();

        let first = engine.run().await.unwrap();
        assert_eq!(first.errors.len(), 1);
        assert_eq!(first.errors[0].kind, FailureKind::Conflict);
        let pending = engine.store().get_note(&note.id).unwrap().unwrap();
        assert_eq!(pending.dirty, DirtyState::LocallyEdited);
        assert_eq!(pending.content, "edited locally");

        let second = engine.run().await.unwrap();
        assert!(second.success);
        assert_eq!(
            engine.remote.get(remote_id).unwrap().content,
            "edited locally"
        );
        assert_eq!(dirty_total(&engine), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dirty_note_survives_remote_listing() {
        let engine = engine();
        let note = engine
            .store()
            .create_note(NoteDraft::from_content("mine"))
            .unwrap();
        engine.run().await.unwrap();
        let remote_id = engine.store().get_note(&note.id).unwrap().unwrap().remote_id.unwrap();

        engine.store().update_note(&note.id, None, "mine, edited").unwrap();
        engine.remote.fail_content("mine, edited");
        engine.remote.remove(remote_id);

        let result = engine.run().await.unwrap();
        assert_eq!(result.removed, 0);
        let kept = engine.store().get_note(&note.id).unwrap().unwrap();
        assert_eq!(kept.content, "mine, edited");
        assert_eq!(kept.dirty, DirtyState::LocallyEdited);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn edit_of_remotely_deleted_note_is_recreated() {
        let engine = engine();
        let note = engine
            .store()
            .create_note(NoteDraft::from_content("resurrect me"))
            .unwrap();
        engine.run().await.unwrap();
        let old_remote = engine.store().get_note(&note.id).unwrap().unwrap().remote_id.unwrap();

        engine.remote.remove(old_remote);
        engine.store().update_note(&note.id, None, "still wanted").unwrap();

        let result = engine.run().await.unwrap();
        assert!(result.success, "{:?}", result.errors);
        let stored = engine.store().get_note(&note.id).unwrap().unwrap();
        assert_ne!(stored.remote_id, Some(old_remote));
        assert_eq!(stored.dirty, DirtyState::Unchanged);
        assert_eq!(engine.remote.notes().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn permit_reports_already_running_during_session() {
        let (remote, hold) = FakeRemote::new().with_list_hold();
        let engine = engine_with(remote);
        assert!(engine.permit().allowed);

        let running = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run().await }
        });
        hold.entered().await;

        assert!(engine.is_running());
        assert_eq!(engine.state(), SyncState::Syncing);
        assert_eq!(engine.permit().reason, Some(GateRejection::AlreadyRunning));
        assert_eq!(engine.run().await.unwrap_err(), GateRejection::AlreadyRunning);

        hold.release();
        let result = running.await.unwrap().unwrap();
        assert!(result.success);
        assert!(!engine.is_running());
        assert!(engine.permit().allowed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn edit_during_upload_is_kept_for_next_pass() {
        let (remote, hold) = FakeRemote::new().with_create_hold();
        let engine = engine_with(remote);
        let note = engine
            .store()
            .create_note(NoteDraft::from_content("first draft"))
            .unwrap();

        let running = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run().await }
        });
        hold.entered().await;
        engine
            .store()
            .update_note(&note.id, None, "second draft")
            .unwrap();
        hold.release();
        running.await.unwrap().unwrap();

        let stored = engine.store().get_note(&note.id).unwrap().unwrap();
        assert_eq!(stored.content, "second draft");
        assert_eq!(stored.dirty, DirtyState::LocallyEdited);
        let remote_id = stored.remote_id.unwrap();

        engine.run().await.unwrap();
        assert_eq!(engine.remote.notes().len(), 1);
        assert_eq!(engine.remote.get(remote_id).unwrap().content, "second draft");
        assert_eq!(dirty_total(&engine), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn callbacks_run_after_every_session_in_order() {
        let engine = engine();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second"] {
            let calls = Arc::clone(&calls);
            let observer = Arc::clone(&engine);
            engine.register_completion_callback(move |result| {
                assert!(!observer.is_running());
                calls.lock().unwrap().push((label, result.success));
            });
        }

        engine.run().await.unwrap();
        engine.run().await.unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ("first", true),
                ("second", true),
                ("first", true),
                ("second", true)
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn abandoned_run_still_records_committed_create() {
        let (remote, hold) = FakeRemote::new().with_create_ack_hold();
        let engine = engine_with(remote);
        let note = engine
            .store()
            .create_note(NoteDraft::from_content("committed remotely"))
            .unwrap();
        let mut states = engine.subscribe();

        let waiting = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run().await }
        });
        hold.entered().await;
        waiting.abort();
        assert!(waiting.await.unwrap_err().is_cancelled());
        hold.release();

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            states.wait_for(|state| *state == SyncState::Synced),
        )
        .await
        .unwrap()
        .unwrap();

        let stored = engine.store().get_note(&note.id).unwrap().unwrap();
        assert_eq!(stored.dirty, DirtyState::Unchanged);
        assert!(stored.remote_id.is_some());

        let again = engine.run().await.unwrap();
        assert_eq!(again.pushed, 0);
        assert_eq!(engine.remote.notes().len(), 1);
        assert_eq!(all_notes(&engine).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn crashed_push_is_attributed_to_its_note() {
        let engine = engine();
        let doomed = engine
            .store()
            .create_note(NoteDraft::from_content("crashes the handler"))
            .unwrap();
        engine
            .store()
            .create_note(NoteDraft::from_content("fine"))
            .unwrap();
        engine.remote.panic_on_content("crashes the handler");

        let result = engine.run().await.unwrap();
        assert_eq!(result.pushed, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, FailureKind::Aborted);
        assert_eq!(result.errors[0].operation, OperationKind::Create);
        assert_eq!(result.errors[0].note, Some(doomed.id));
        assert_eq!(result.operations_completed, result.operations_dispatched);
        assert_eq!(dirty_total(&engine), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_run_is_not_attempted() {
        let monitor = Arc::new(StaticNetworkMonitor::new(NetworkStatus::default()));
        let store = NoteStore::open_in_memory("alice").unwrap();
        let engine = SyncEngine::new(store, FakeRemote::new(), SyncGate::new(monitor.clone()));
        let mut states = engine.subscribe();

        assert_eq!(engine.run().await.unwrap_err(), GateRejection::NoNetwork);
        assert_eq!(engine.remote.calls(), 0);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SyncState::Offline);

        monitor.set(NetworkStatus {
            connected: true,
            metered: true,
        });
        engine.gate().set_only_unmetered(true);
        assert_eq!(
            engine.run().await.unwrap_err(),
            GateRejection::NetworkRestricted
        );

        engine.gate().set_only_unmetered(false);
        engine.run().await.unwrap();
        assert_eq!(engine.state(), SyncState::Synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accounts_sync_independently() {
        let gate = online_gate();
        let alice_store = NoteStore::open_in_memory("alice").unwrap();
        let bob_store = alice_store.for_account("bob");
        let (alice_remote, hold) = FakeRemote::new().with_list_hold();
        let alice = Arc::new(SyncEngine::new(alice_store, alice_remote, gate.clone()));
        let bob = SyncEngine::new(bob_store, FakeRemote::new(), gate);

        let running = tokio::spawn({
            let alice = Arc::clone(&alice);
            async move { alice.run().await }
        });
        hold.entered().await;

        assert!(bob.permit().allowed);
        assert!(bob.run().await.unwrap().success);

        hold.release();
        assert!(running.await.unwrap().is_ok());
    }

    #[test]
    fn tracker_counts() {
        let mut tracker = OperationTracker::default();
        assert!(tracker.is_settled());
        tracker.dispatch();
        tracker.dispatch();
        tracker.complete();
        assert!(!tracker.is_settled());
        tracker.complete();
        assert!(tracker.is_settled());
        assert_eq!((tracker.dispatched(), tracker.completed()), (2, 2));
    }
}
