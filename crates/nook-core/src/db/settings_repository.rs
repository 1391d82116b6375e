//! Settings repository implementation

use crate::error::Result;
use crate::models::Settings;
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for settings storage operations
pub trait SettingsRepository {
    /// Load settings from the database
    fn load(&self) -> Result<Settings>;

    /// Save settings to the database
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// `SQLite` implementation of `SettingsRepository`
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn load(&self) -> Result<Settings> {
        let mut settings = Settings::default();

        if let Some(value) = self.get_setting("sync_only_on_unmetered")? {
            settings.sync_only_on_unmetered = parse_flag(&value);
        }

        if let Some(value) = self.get_setting("background_sync_enabled")? {
            settings.background_sync_enabled = parse_flag(&value);
        }

        if let Some(value) = self.get_setting("background_sync_interval_secs")? {
            if let Ok(secs) = value.trim().parse() {
                settings.background_sync_interval_secs = secs;
            }
        }

        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.set_setting(
            "sync_only_on_unmetered",
            &settings.sync_only_on_unmetered.to_string(),
        )?;
        self.set_setting(
            "background_sync_enabled",
            &settings.background_sync_enabled.to_string(),
        )?;
        self.set_setting(
            "background_sync_interval_secs",
            &settings.background_sync_interval_secs.to_string(),
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_load_defaults() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSettingsRepository::new(db.connection());

        let settings = repo.load().unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSettingsRepository::new(db.connection());

        let settings = Settings {
            sync_only_on_unmetered: true,
            background_sync_enabled: false,
            background_sync_interval_secs: 300,
        };

        repo.save(&settings).unwrap();
        let loaded = repo.load().unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_ignores_garbage_interval() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSettingsRepository::new(db.connection());
        repo.set_setting("background_sync_interval_secs", "soon")
            .unwrap();
        repo.set_setting("sync_only_on_unmetered", "YES").unwrap();

        let loaded = repo.load().unwrap();
        assert!(loaded.sync_only_on_unmetered);
        assert_eq!(
            loaded.background_sync_interval_secs,
            Settings::default().background_sync_interval_secs
        );
    }
}
