use std::io;

use nook_core::sync::GateRejection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] nook_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Edited note content cannot be empty")]
    EmptyEditedContent,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Credential error: {0}")]
    Credentials(String),
    #[error(
        "Account '{0}' is not configured. Run `nook account add {0} --server <URL> --username <USER>` first."
    )]
    AccountNotConfigured(String),
    #[error("No password for account '{0}'. Pass --password to `nook account add` or set NOOK_PASSWORD.")]
    MissingPassword(String),
    #[error("Sync not attempted: {0}")]
    SyncNotAttempted(#[from] GateRejection),
    #[error("Sync finished with {0} failed operation(s)")]
    SyncFailed(usize),
}
