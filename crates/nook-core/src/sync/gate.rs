//! Admission control for sync sessions.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;

/// Why a sync was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateRejection {
    #[error("a sync is already running for this account")]
    AlreadyRunning,
    #[error("no network connection")]
    NoNetwork,
    #[error("sync is restricted to unmetered networks")]
    NetworkRestricted,
}

/// Answer of [`SyncGate::permit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Permit {
    pub allowed: bool,
    pub reason: Option<GateRejection>,
}

impl Permit {
    const fn from_check(check: Result<(), GateRejection>) -> Self {
        match check {
            Ok(()) => Self {
                allowed: true,
                reason: None,
            },
            Err(reason) => Self {
                allowed: false,
                reason: Some(reason),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkStatus {
    pub connected: bool,
    pub metered: bool,
}

/// Source of the current network conditions.
pub trait NetworkMonitor: Send + Sync {
    fn status(&self) -> NetworkStatus;
}

/// Network monitor whose status is set explicitly, for hosts that have no
/// way to probe connectivity and for tests.
#[derive(Debug, Default)]
pub struct StaticNetworkMonitor {
    connected: AtomicBool,
    metered: AtomicBool,
}

impl StaticNetworkMonitor {
    pub const fn new(status: NetworkStatus) -> Self {
        Self {
            connected: AtomicBool::new(status.connected),
            metered: AtomicBool::new(status.metered),
        }
    }

    /// Connected over an unmetered network.
    pub const fn online() -> Self {
        Self::new(NetworkStatus {
            connected: true,
            metered: false,
        })
    }

    pub fn set(&self, status: NetworkStatus) {
        self.connected.store(status.connected, Ordering::SeqCst);
        self.metered.store(status.metered, Ordering::SeqCst);
    }
}

impl NetworkMonitor for StaticNetworkMonitor {
    fn status(&self) -> NetworkStatus {
        NetworkStatus {
            connected: self.connected.load(Ordering::SeqCst),
            metered: self.metered.load(Ordering::SeqCst),
        }
    }
}

struct GateInner {
    network: Arc<dyn NetworkMonitor>,
    only_unmetered: AtomicBool,
    running: Mutex<HashSet<String>>,
}

impl GateInner {
    fn running(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, running: &HashSet<String>, account: &str) -> Result<(), GateRejection> {
        if running.contains(account) {
            return Err(GateRejection::AlreadyRunning);
        }

        let status = self.network.status();
        if !status.connected {
            return Err(GateRejection::NoNetwork);
        }
        if status.metered && self.only_unmetered.load(Ordering::SeqCst) {
            return Err(GateRejection::NetworkRestricted);
        }
        Ok(())
    }
}

/// Decides whether a sync may start and tracks which accounts are syncing.
///
/// Clones share the running set, so one gate serializes sessions per account
/// across every engine built from it.
#[derive(Clone)]
pub struct SyncGate {
    inner: Arc<GateInner>,
}

impl SyncGate {
    pub fn new(network: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                network,
                only_unmetered: AtomicBool::new(false),
                running: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Restrict sync to unmetered networks.
    pub fn set_only_unmetered(&self, only_unmetered: bool) {
        self.inner
            .only_unmetered
            .store(only_unmetered, Ordering::SeqCst);
    }

    pub fn only_unmetered(&self) -> bool {
        self.inner.only_unmetered.load(Ordering::SeqCst)
    }

    pub fn is_running(&self, account: &str) -> bool {
        self.inner.running().contains(account)
    }

    /// Check whether a sync for `account` would be admitted right now.
    ///
    /// Checks run in order: already running, no network, metered network
    /// under the unmetered-only policy. Nothing is reserved.
    pub fn permit(&self, account: &str) -> Permit {
        let running = self.inner.running();
        Permit::from_check(self.inner.check(&running, account))
    }

    /// Check and reserve `account` in one step.
    ///
    /// The reservation is released when the returned guard is dropped.
    pub fn acquire(&self, account: &str) -> Result<RunningGuard, GateRejection> {
        let mut running = self.inner.running();
        self.inner.check(&running, account)?;
        running.insert(account.to_string());
        drop(running);

        tracing::debug!("Sync slot acquired for account {account}");
        Ok(RunningGuard {
            gate: Arc::clone(&self.inner),
            account: account.to_string(),
        })
    }
}

/// Marks an account as syncing until dropped.
#[must_use = "the account is released as soon as the guard is dropped"]
pub struct RunningGuard {
    gate: Arc<GateInner>,
    account: String,
}

impl RunningGuard {
    pub fn account(&self) -> &str {
        &self.account
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.gate.running().remove(&self.account);
        tracing::debug!("Sync slot released for account {}", self.account);
    }
}

impl std::fmt::Debug for RunningGuard {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RunningGuard")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}
