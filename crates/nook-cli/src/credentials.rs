//! Account passwords with secure keychain persistence.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "nook-cli";

const PASSWORD_ENV: &str = "NOOK_PASSWORD";

#[derive(Clone)]
pub struct PasswordStore {
    username: String,
}

impl PasswordStore {
    pub fn new(account: &str) -> Self {
        Self {
            username: format!("account_password:{account}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, CliError> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| CliError::Credentials(error.to_string()))
    }

    #[cfg(not(test))]
    pub fn load(&self) -> Result<Option<String>, CliError> {
        match self.entry()?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(CliError::Credentials(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn load(&self) -> Result<Option<String>, CliError> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Credentials(error.to_string()))?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    pub fn save(&self, password: &str) -> Result<(), CliError> {
        self.entry()?
            .set_password(password)
            .map_err(|error| CliError::Credentials(error.to_string()))
    }

    #[cfg(test)]
    pub fn save(&self, password: &str) -> Result<(), CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Credentials(error.to_string()))?;
        guard.insert(self.username.clone(), password.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    pub fn clear(&self) -> Result<(), CliError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(CliError::Credentials(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> Result<(), CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Credentials(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

/// Keychain password for `account`, falling back to `NOOK_PASSWORD`.
pub fn resolve_password(account: &str) -> Result<String, CliError> {
    let stored = match PasswordStore::new(account).load() {
        Ok(stored) => stored,
        Err(error) => {
            tracing::debug!("Keychain unavailable for account {account}: {error}");
            None
        }
    };

    stored
        .or_else(|| nook_core::util::normalize_text_option(std::env::var(PASSWORD_ENV).ok()))
        .ok_or_else(|| CliError::MissingPassword(account.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_password_roundtrip() {
        let store = PasswordStore::new("credentials-roundtrip");
        assert_eq!(store.load().unwrap(), None);

        store.save("app-token").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("app-token"));
        assert_eq!(resolve_password("credentials-roundtrip").unwrap(), "app-token");

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn accounts_do_not_share_passwords() {
        PasswordStore::new("credentials-a").save("a").unwrap();
        assert_eq!(PasswordStore::new("credentials-b").load().unwrap(), None);
    }
}
