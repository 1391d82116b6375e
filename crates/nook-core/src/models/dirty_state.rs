//! Per-note local sync status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Marks whether a note carries local changes the remote has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyState {
    /// In agreement with the last confirmed remote copy.
    #[default]
    Unchanged,
    /// Created locally, not yet known to the remote.
    LocallyCreated,
    /// Known to the remote, edited locally since.
    LocallyEdited,
    /// Deleted locally; the row stays until the remote confirms.
    LocallyDeleted,
}

impl DirtyState {
    /// The three states that the push phase uploads, in dispatch order.
    pub const PENDING: [Self; 3] = [
        Self::LocallyCreated,
        Self::LocallyEdited,
        Self::LocallyDeleted,
    ];

    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::LocallyCreated => "locally_created",
            Self::LocallyEdited => "locally_edited",
            Self::LocallyDeleted => "locally_deleted",
        }
    }

    /// Whether the note has changes waiting for the push phase.
    #[must_use]
    pub const fn is_dirty(self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// State after a local content, category or favorite change.
    ///
    /// Notes the remote has never seen stay `LocallyCreated`; deleted notes
    /// cannot be edited.
    #[must_use]
    pub const fn after_local_edit(self) -> Self {
        match self {
            Self::Unchanged | Self::LocallyEdited => Self::LocallyEdited,
            Self::LocallyCreated => Self::LocallyCreated,
            Self::LocallyDeleted => Self::LocallyDeleted,
        }
    }
}

impl fmt::Display for DirtyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DirtyState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unchanged" => Ok(Self::Unchanged),
            "locally_created" => Ok(Self::LocallyCreated),
            "locally_edited" => Ok(Self::LocallyEdited),
            "locally_deleted" => Ok(Self::LocallyDeleted),
            other => Err(Error::InvalidInput(format!("unknown dirty state '{other}'"))),
        }
    }
}
