//! Shared cross-client sync state.

use serde::{Deserialize, Serialize};

/// Coarse sync state published by the engine for status indicators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No session has run yet.
    #[default]
    Idle,
    /// The last attempt was refused because the network is unavailable.
    Offline,
    Syncing,
    Synced,
    /// The last session finished with at least one failed operation.
    Error,
}
