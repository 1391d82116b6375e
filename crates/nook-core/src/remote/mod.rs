//! Remote notes service client abstraction.

mod http;

use std::future::Future;

use thiserror::Error;

use crate::models::{NoteDraft, RemoteId, RemoteNote};

pub use http::{Credentials, HttpNotesClient, NOTES_API_PATH};

/// Failures reported by a remote notes service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network unreachable, timeout, or a server-side outage. Retried next pass.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The server answered with something we cannot interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The remote copy changed since the version we last saw.
    #[error("Remote note {0} was modified since it was last synced")]
    Conflict(RemoteId),
    /// The remote copy does not exist (anymore).
    #[error("Remote note {0} not found")]
    NotFound(RemoteId),
}

impl RemoteError {
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// CRUD access to the remote note collection of one account.
///
/// Futures are `Send` so the engine can drive every push operation on its own
/// task.
pub trait RemoteClient: Send + Sync + 'static {
    /// Create a note, returning the server copy with its assigned id.
    fn create(&self, draft: &NoteDraft) -> impl Future<Output = RemoteResult<RemoteNote>> + Send;

    /// Overwrite a note. When `etag` is given the server rejects the write with
    /// [`RemoteError::Conflict`] if its copy moved on.
    fn update(
        &self,
        remote_id: RemoteId,
        draft: &NoteDraft,
        etag: Option<&str>,
    ) -> impl Future<Output = RemoteResult<RemoteNote>> + Send;

    /// Delete a note.
    fn delete(&self, remote_id: RemoteId) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Fetch the full remote note list.
    fn list(&self) -> impl Future<Output = RemoteResult<Vec<RemoteNote>>> + Send;
}
