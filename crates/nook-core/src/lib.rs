//! nook-core - Core library for nook
//!
//! This crate contains the note models, the `SQLite` local store, the remote
//! notes client, and the synchronization engine that reconciles the two.

pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{DirtyState, Note, NoteDraft, NoteId, RemoteId, RemoteNote};
