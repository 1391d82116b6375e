//! Sync preferences model

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default period between background sync attempts.
pub const DEFAULT_BACKGROUND_INTERVAL_SECS: u64 = 15 * 60;

/// User-controlled sync preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Only sync while on an unmetered (e.g. wifi) network
    pub sync_only_on_unmetered: bool,
    /// Run sync periodically without user interaction
    pub background_sync_enabled: bool,
    /// Seconds between background sync attempts
    pub background_sync_interval_secs: u64,
}

impl Settings {
    /// Background sync period, clamped to at least one minute.
    #[must_use]
    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_sync_interval_secs.max(60))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sync_only_on_unmetered: false,
            background_sync_enabled: true,
            background_sync_interval_secs: DEFAULT_BACKGROUND_INTERVAL_SECS,
        }
    }
}
