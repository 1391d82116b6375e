//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::DirtyState;

/// Local surrogate identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier the remote service assigned to a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub i64);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A note as stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Local identifier, always present
    pub id: NoteId,
    /// Remote identifier, present once the note exists server-side
    pub remote_id: Option<RemoteId>,
    /// Server version tag of the last confirmed copy
    pub etag: Option<String>,
    pub title: String,
    pub content: String,
    /// Slash-delimited category path, kept verbatim
    pub category: Option<String>,
    pub favorite: bool,
    /// Last modification timestamp (Unix ms)
    pub modified: i64,
    pub dirty: DirtyState,
    /// Local mutation counter, bumped on every local change
    pub revision: i64,
}

impl Note {
    /// Create a note that only exists locally so far.
    #[must_use]
    pub fn new_local(draft: NoteDraft) -> Self {
        Self {
            id: NoteId::new(),
            remote_id: None,
            etag: None,
            title: draft.title,
            content: draft.content,
            category: draft.category,
            favorite: draft.favorite,
            modified: draft.modified,
            dirty: DirtyState::LocallyCreated,
            revision: 0,
        }
    }

    /// Adopt a remote copy as a fresh, clean local note.
    #[must_use]
    pub fn from_remote(remote: RemoteNote) -> Self {
        Self {
            id: NoteId::new(),
            remote_id: Some(remote.remote_id),
            etag: remote.etag,
            title: remote.title,
            content: remote.content,
            category: remote.category,
            favorite: remote.favorite,
            modified: remote.modified,
            dirty: DirtyState::Unchanged,
            revision: 0,
        }
    }

    /// Payload uploaded during the push phase.
    #[must_use]
    pub fn draft(&self) -> NoteDraft {
        NoteDraft {
            title: self.title.clone(),
            content: self.content.clone(),
            category: self.category.clone(),
            favorite: self.favorite,
            modified: self.modified,
        }
    }

    /// First line of the content, truncated to `max_len` characters
    #[must_use]
    pub fn excerpt(&self, max_len: usize) -> String {
        self.content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && *line != self.title.trim())
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }
}

/// Note content sent to the remote on create and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub favorite: bool,
    /// Unix ms
    pub modified: i64,
}

impl NoteDraft {
    /// Build a draft from raw content, deriving the title from the first line.
    #[must_use]
    pub fn from_content(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            title: derive_title(&content),
            content,
            category: None,
            favorite: false,
            modified: crate::util::unix_millis_now(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        if !title.trim().is_empty() {
            self.title = title.trim().to_string();
        }
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub const fn with_favorite(mut self, favorite: bool) -> Self {
        self.favorite = favorite;
        self
    }
}

/// A note as reported by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNote {
    pub remote_id: RemoteId,
    pub etag: Option<String>,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub favorite: bool,
    /// Unix ms
    pub modified: i64,
}

/// Derive a title from the first non-empty content line, without markdown heading markers.
///
/// # Examples
///
/// ```
/// use nook_core::models::derive_title;
///
/// assert_eq!(derive_title("\n# Groceries\n- milk"), "Groceries");
/// assert_eq!(derive_title("   "), "");
/// ```
#[must_use]
pub fn derive_title(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches('#').trim())
        .unwrap_or("")
        .chars()
        .take(100)
        .collect()
}
