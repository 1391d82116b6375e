//! In-memory remote notes service with failure injection.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::models::{NoteDraft, RemoteId, RemoteNote};
use crate::remote::{RemoteClient, RemoteError, RemoteResult};

/// Pauses an operation until released.
#[derive(Default)]
pub struct Hold {
    entered: Notify,
    release: Notify,
}

impl Hold {
    /// Wait until the held operation has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct State {
    next_id: i64,
    version: u64,
    notes: BTreeMap<RemoteId, RemoteNote>,
    failing_content: HashSet<String>,
    failing_deletes: HashSet<RemoteId>,
    panicking_content: HashSet<String>,
    list_failure: Option<RemoteError>,
}

impl State {
    fn next_etag(&mut self, remote_id: RemoteId) -> String {
        self.version += 1;
        format!("e{}-{}", remote_id.0, self.version)
    }

    fn store(&mut self, remote_id: RemoteId, draft: &NoteDraft) -> RemoteNote {
        let note = RemoteNote {
            remote_id,
            etag: Some(self.next_etag(remote_id)),
            title: draft.title.clone(),
            content: draft.content.clone(),
            category: draft.category.clone(),
            favorite: draft.favorite,
            modified: draft.modified,
        };
        self.notes.insert(remote_id, note.clone());
        note
    }
}

#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<State>,
    calls: AtomicUsize,
    list_hold: Option<Arc<Hold>>,
    create_hold: Option<Arc<Hold>>,
    create_ack_hold: Option<Arc<Hold>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block `list` until the returned hold is released.
    pub fn with_list_hold(mut self) -> (Self, Arc<Hold>) {
        let hold = Arc::new(Hold::default());
        self.list_hold = Some(Arc::clone(&hold));
        (self, hold)
    }

    /// Block `create` until the returned hold is released.
    pub fn with_create_hold(mut self) -> (Self, Arc<Hold>) {
        let hold = Arc::new(Hold::default());
        self.create_hold = Some(Arc::clone(&hold));
        (self, hold)
    }

    /// Block `create` after the server stored the note, before it answers.
    pub fn with_create_ack_hold(mut self) -> (Self, Arc<Hold>) {
        let hold = Arc::new(Hold::default());
        self.create_ack_hold = Some(Arc::clone(&hold));
        (self, hold)
    }

    /// Seed a server-side note, as if another client created it.
    pub fn seed(&self, content: &str) -> RemoteNote {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let remote_id = RemoteId(state.next_id);
        state.store(remote_id, &NoteDraft::from_content(content))
    }

    /// Change a note server-side, bumping its etag.
    pub fn edit(&self, remote_id: RemoteId, content: &str) {
        let mut state = self.state.lock().unwrap();
        state.store(remote_id, &NoteDraft::from_content(content));
    }

    /// Remove a note server-side without telling the client.
    pub fn remove(&self, remote_id: RemoteId) {
        self.state.lock().unwrap().notes.remove(&remote_id);
    }

    /// Fail create and update of any draft with this content.
    pub fn fail_content(&self, content: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_content
            .insert(content.to_string());
    }

    /// Panic inside `create` for any draft with this content.
    pub fn panic_on_content(&self, content: &str) {
        self.state
            .lock()
            .unwrap()
            .panicking_content
            .insert(content.to_string());
    }

    pub fn fail_delete(&self, remote_id: RemoteId) {
        self.state.lock().unwrap().failing_deletes.insert(remote_id);
    }

    pub fn fail_list(&self, error: RemoteError) {
        self.state.lock().unwrap().list_failure = Some(error);
    }

    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing_content.clear();
        state.failing_deletes.clear();
        state.panicking_content.clear();
        state.list_failure = None;
    }

    pub fn notes(&self) -> Vec<RemoteNote> {
        self.state.lock().unwrap().notes.values().cloned().collect()
    }

    pub fn get(&self, remote_id: RemoteId) -> Option<RemoteNote> {
        self.state.lock().unwrap().notes.get(&remote_id).cloned()
    }

    /// Number of remote calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn transport(what: &str) -> RemoteError {
        RemoteError::Transport(format!("{what}: connection reset"))
    }
}

impl RemoteClient for FakeRemote {
    async fn create(&self, draft: &NoteDraft) -> RemoteResult<RemoteNote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hold) = &self.create_hold {
            hold.pass().await;
        }
        tokio::task::yield_now().await;

        let panics = self
            .state
            .lock()
            .unwrap()
            .panicking_content
            .contains(&draft.content);
        assert!(!panics, "create handler crashed");

        let created = {
            let mut state = self.state.lock().unwrap();
            if state.failing_content.contains(&draft.content) {
                return Err(Self::transport("create"));
            }
            state.next_id += 1;
            let remote_id = RemoteId(state.next_id);
            state.store(remote_id, draft)
        };
        if let Some(hold) = &self.create_ack_hold {
            hold.pass().await;
        }
        Ok(created)
    }

    async fn update(
        &self,
        remote_id: RemoteId,
        draft: &NoteDraft,
        etag: Option<&str>,
    ) -> RemoteResult<RemoteNote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if state.failing_content.contains(&draft.content) {
            return Err(Self::transport("update"));
        }
        let current = state
            .notes
            .get(&remote_id)
            .ok_or(RemoteError::NotFound(remote_id))?;
        if etag.is_some() && current.etag.as_deref() != etag {
            return Err(RemoteError::Conflict(remote_id));
        }
        Ok(state.store(remote_id, draft))
    }

    async fn delete(&self, remote_id: RemoteId) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if state.failing_deletes.contains(&remote_id) {
            return Err(Self::transport("delete"));
        }
        state
            .notes
            .remove(&remote_id)
            .map(|_| ())
            .ok_or(RemoteError::NotFound(remote_id))
    }

    async fn list(&self) -> RemoteResult<Vec<RemoteNote>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hold) = &self.list_hold {
            hold.pass().await;
        }
        tokio::task::yield_now().await;

        let state = self.state.lock().unwrap();
        if let Some(error) = &state.list_failure {
            return Err(error.clone());
        }
        Ok(state.notes.values().cloned().collect())
    }
}
