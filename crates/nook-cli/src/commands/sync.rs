use std::sync::Arc;
use std::time::Duration;

use nook_core::db::NoteStore;
use nook_core::models::Settings;
use nook_core::remote::{Credentials, HttpNotesClient};
use nook_core::state::SyncState;
use nook_core::sync::{
    BackgroundSync, NetworkStatus, StaticNetworkMonitor, SyncEngine, SyncGate, SyncResult,
};

use crate::accounts::{Account, AccountsConfig};
use crate::commands::common::StoreTarget;
use crate::credentials::resolve_password;
use crate::error::CliError;

type CliEngine = SyncEngine<NoteStore, HttpNotesClient>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub metered: bool,
    pub offline: bool,
    pub as_json: bool,
    /// `Some(None)` watches with the interval from the settings.
    pub watch: Option<Option<u64>>,
}

impl SyncOptions {
    pub const fn network_status(&self) -> NetworkStatus {
        NetworkStatus {
            connected: !self.offline,
            metered: self.metered,
        }
    }

    pub fn watch_interval(&self, settings: &Settings) -> Option<Duration> {
        self.watch.map(|secs| {
            secs.map_or_else(
                || settings.background_interval(),
                |secs| Duration::from_secs(secs.max(1)),
            )
        })
    }
}

pub fn sync_gate(options: &SyncOptions, settings: &Settings) -> SyncGate {
    let gate = SyncGate::new(Arc::new(StaticNetworkMonitor::new(options.network_status())));
    gate.set_only_unmetered(settings.sync_only_on_unmetered);
    gate
}

pub async fn run_sync(options: SyncOptions, target: &StoreTarget) -> Result<(), CliError> {
    let store = target.open()?;
    let settings = store.load_settings()?;
    let gate = sync_gate(&options, &settings);
    let watch_interval = options.watch_interval(&settings);

    if watch_interval.is_none() {
        if let Some(reason) = gate.permit(&target.account).reason {
            return Err(CliError::SyncNotAttempted(reason));
        }
    }

    let remote = connect(&target.account)?;
    let engine = Arc::new(SyncEngine::new(store, remote, gate));

    if let Some(interval) = watch_interval {
        return watch(engine, interval, options.as_json).await;
    }

    let result = engine.run().await?;
    if options.as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_sync_lines(&result) {
            println!("{line}");
        }
    }

    if result.success {
        Ok(())
    } else {
        Err(CliError::SyncFailed(result.errors.len()))
    }
}

fn connect(account: &str) -> Result<HttpNotesClient, CliError> {
    let config = AccountsConfig::load().map_err(CliError::Config)?;
    let (server_url, username) = config
        .account(account)
        .and_then(Account::connection)
        .ok_or_else(|| CliError::AccountNotConfigured(account.to_string()))?;
    let password = resolve_password(account)?;

    Ok(HttpNotesClient::new(
        server_url,
        Credentials { username, password },
    )?)
}

async fn watch(engine: Arc<CliEngine>, interval: Duration, as_json: bool) -> Result<(), CliError> {
    let mut states = engine.subscribe();
    let background = BackgroundSync::spawn(Arc::clone(&engine), interval);
    if !as_json {
        println!(
            "Syncing '{}' every {}s. Press Ctrl-C to stop.",
            engine.account(),
            interval.as_secs()
        );
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                let pending = engine.store().dirty_counts()?.total();
                if as_json {
                    println!("{}", serde_json::json!({ "state": state, "pending": pending }));
                } else if let Some(line) = format_state_line(state, pending) {
                    println!("{line}");
                }
            }
        }
    }

    if engine.is_running() && !as_json {
        println!("Finishing the sync in progress...");
    }
    background.stop().await;
    Ok(())
}

pub fn format_state_line(state: SyncState, pending: usize) -> Option<String> {
    match state {
        SyncState::Idle | SyncState::Syncing => None,
        SyncState::Offline => Some("Sync skipped: network unavailable".to_string()),
        SyncState::Synced => Some(format!("Synced, {pending} change(s) pending")),
        SyncState::Error => Some(format!(
            "Sync finished with errors, {pending} change(s) pending"
        )),
    }
}

pub fn format_sync_lines(result: &SyncResult) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync {}: {} uploaded, {} deleted, {} downloaded, {} updated, {} removed",
        if result.success { "completed" } else { "finished with errors" },
        result.pushed,
        result.purged,
        result.inserted,
        result.refreshed,
        result.removed
    )];
    if !result.snapshot_applied {
        lines.push("Remote notes were not downloaded; local notes left untouched.".to_string());
    }
    lines.extend(
        result
            .errors
            .iter()
            .map(|failure| format!("  failed: {failure}")),
    );
    lines
}
