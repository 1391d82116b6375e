//! Persistent account configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nook_core::util::{is_http_url, normalize_text_option};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "accounts.json";
const DEFAULT_ACCOUNT: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountsConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_account: Option<String>,
    #[serde(default)]
    pub accounts: BTreeMap<String, Account>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join("nook").join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Failed to resolve config directory".to_string())
}

pub fn normalize_account_name(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Trim a server URL and strip trailing slashes; only http(s) is accepted.
pub fn normalize_server_url(value: &str) -> Result<String, String> {
    let value = value.trim();
    if !is_http_url(value) {
        return Err(format!(
            "Server URL '{value}' must start with http:// or https://"
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}

impl AccountsConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Explicit name, then `NOOK_ACCOUNT`, then the active account.
    pub fn resolve_account_name(&self, explicit: Option<&str>) -> String {
        self.resolve_account_name_with_env(
            explicit,
            std::env::var("NOOK_ACCOUNT").ok().as_deref(),
        )
    }

    fn resolve_account_name_with_env(&self, explicit: Option<&str>, env: Option<&str>) -> String {
        normalize_account_name(explicit)
            .or_else(|| normalize_account_name(env))
            .or_else(|| normalize_account_name(self.active_account.as_deref()))
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string())
    }

    pub fn account(&self, name: &str) -> Option<&Account> {
        self.accounts.get(name)
    }

    pub fn account_mut_or_default(&mut self, name: &str) -> &mut Account {
        self.accounts.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_account = normalize_account_name(self.active_account.as_deref());
        for account in self.accounts.values_mut() {
            account.normalize();
        }
    }
}

impl Account {
    /// Server URL and username, when both are configured.
    pub fn connection(&self) -> Option<(String, String)> {
        let server_url = normalize_text_option(self.server_url.clone())?;
        let username = normalize_text_option(self.username.clone())?;
        Some((server_url, username))
    }

    fn normalize(&mut self) {
        self.server_url = normalize_text_option(self.server_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());
        self.username = normalize_text_option(self.username.clone());
    }
}
