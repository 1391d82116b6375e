use nook_core::models::Settings;

use crate::commands::common::StoreTarget;
use crate::error::CliError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettingsChange {
    pub unmetered_only: Option<bool>,
    pub background: Option<bool>,
    pub interval_secs: Option<u64>,
}

impl SettingsChange {
    pub const fn is_empty(&self) -> bool {
        self.unmetered_only.is_none() && self.background.is_none() && self.interval_secs.is_none()
    }

    pub fn apply(self, settings: &mut Settings) {
        if let Some(unmetered_only) = self.unmetered_only {
            settings.sync_only_on_unmetered = unmetered_only;
        }
        if let Some(background) = self.background {
            settings.background_sync_enabled = background;
        }
        if let Some(interval_secs) = self.interval_secs {
            settings.background_sync_interval_secs = interval_secs;
        }
    }
}

pub fn format_settings_lines(settings: &Settings) -> Vec<String> {
    vec![
        format!("Sync only on unmetered networks: {}", settings.sync_only_on_unmetered),
        format!("Background sync: {}", settings.background_sync_enabled),
        format!(
            "Background sync interval: {}s",
            settings.background_interval().as_secs()
        ),
    ]
}

pub fn run_settings(
    change: SettingsChange,
    as_json: bool,
    target: &StoreTarget,
) -> Result<(), CliError> {
    let store = target.open()?;
    let mut settings = store.load_settings()?;
    if !change.is_empty() {
        change.apply(&mut settings);
        store.save_settings(&settings)?;
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        for line in format_settings_lines(&settings) {
            println!("{line}");
        }
    }
    Ok(())
}
