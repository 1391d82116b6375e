use crate::accounts::{normalize_account_name, normalize_server_url, AccountsConfig};
use crate::cli::AccountCommands;
use crate::credentials::PasswordStore;
use crate::error::CliError;

pub fn run_account(command: AccountCommands) -> Result<(), CliError> {
    let mut config = AccountsConfig::load().map_err(CliError::Config)?;
    let changed = apply_account_command(&mut config, command)?;
    if changed {
        let path = config.save().map_err(CliError::Config)?;
        tracing::debug!("Saved accounts to {}", path.display());
    }
    Ok(())
}

/// Apply `command` to `config`, returning whether it needs saving.
pub fn apply_account_command(
    config: &mut AccountsConfig,
    command: AccountCommands,
) -> Result<bool, CliError> {
    match command {
        AccountCommands::Add {
            name,
            server,
            username,
            password,
            no_activate,
        } => {
            let name = require_account_name(&name)?;
            let server_url = normalize_server_url(&server).map_err(CliError::Config)?;
            let username = nook_core::util::normalize_text_option(Some(username))
                .ok_or_else(|| CliError::Config("Username cannot be empty".to_string()))?;

            let account = config.account_mut_or_default(&name);
            account.server_url = Some(server_url.clone());
            account.username = Some(username.clone());

            if let Some(password) = nook_core::util::normalize_text_option(password) {
                PasswordStore::new(&name).save(&password)?;
            }
            if !no_activate || config.active_account.is_none() {
                config.active_account = Some(name.clone());
            }

            println!("Account '{name}' set to {username} @ {server_url}");
            Ok(true)
        }
        AccountCommands::Use { name } => {
            let name = require_account_name(&name)?;
            if config.account(&name).is_none() {
                return Err(CliError::AccountNotConfigured(name));
            }
            config.active_account = Some(name.clone());
            println!("Active account: {name}");
            Ok(true)
        }
        AccountCommands::List => {
            if config.accounts.is_empty() {
                println!("No accounts configured.");
                return Ok(false);
            }
            for line in format_account_lines(config) {
                println!("{line}");
            }
            Ok(false)
        }
        AccountCommands::Remove { name } => {
            let name = require_account_name(&name)?;
            if config.accounts.remove(&name).is_none() {
                return Err(CliError::AccountNotConfigured(name));
            }
            if config.active_account.as_deref() == Some(name.as_str()) {
                config.active_account = config.accounts.keys().next().cloned();
            }
            PasswordStore::new(&name).clear()?;
            println!("Removed account '{name}'");
            Ok(true)
        }
    }
}

pub fn format_account_lines(config: &AccountsConfig) -> Vec<String> {
    config
        .accounts
        .iter()
        .map(|(name, account)| {
            let marker = if config.active_account.as_deref() == Some(name.as_str()) {
                '*'
            } else {
                ' '
            };
            let username = account.username.as_deref().unwrap_or("?");
            let server = account.server_url.as_deref().unwrap_or("(no server)");
            format!("{marker} {name:<16} {username} @ {server}")
        })
        .collect()
}

fn require_account_name(name: &str) -> Result<String, CliError> {
    normalize_account_name(Some(name))
        .ok_or_else(|| CliError::Config("Account name cannot be empty".to_string()))
}
