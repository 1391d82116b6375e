//! Data models for nook

mod dirty_state;
mod note;
mod settings;

pub use dirty_state::DirtyState;
pub use note::{derive_title, Note, NoteDraft, NoteId, RemoteId, RemoteNote};
pub use settings::Settings;
