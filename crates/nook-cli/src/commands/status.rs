use nook_core::db::DirtyCounts;
use serde::Serialize;

use crate::accounts::AccountsConfig;
use crate::commands::common::StoreTarget;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub account: String,
    pub server_url: Option<String>,
    pub pending_created: usize,
    pub pending_edited: usize,
    pub pending_deleted: usize,
}

impl StatusReport {
    pub fn new(account: &str, server_url: Option<String>, counts: DirtyCounts) -> Self {
        Self {
            account: account.to_string(),
            server_url,
            pending_created: counts.created,
            pending_edited: counts.edited,
            pending_deleted: counts.deleted,
        }
    }

    pub const fn pending_total(&self) -> usize {
        self.pending_created + self.pending_edited + self.pending_deleted
    }

    pub fn lines(&self) -> Vec<String> {
        let server = self.server_url.as_deref().unwrap_or("(not configured)");
        let mut lines = vec![format!("Account: {} ({server})", self.account)];
        if self.pending_total() == 0 {
            lines.push("Everything is synced.".to_string());
        } else {
            lines.push(format!(
                "Pending: {} new, {} edited, {} deleted",
                self.pending_created, self.pending_edited, self.pending_deleted
            ));
        }
        lines
    }
}

pub fn run_status(as_json: bool, target: &StoreTarget) -> Result<(), CliError> {
    let config = AccountsConfig::load().map_err(CliError::Config)?;
    let server_url = config
        .account(&target.account)
        .and_then(|account| account.server_url.clone());
    let counts = target.open()?.dirty_counts()?;
    let report = StatusReport::new(&target.account, server_url, counts);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report.lines() {
            println!("{line}");
        }
    }
    Ok(())
}
