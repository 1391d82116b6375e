//! Periodic background sync.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::gate::GateRejection;
use super::session::SyncEngine;
use super::store::LocalStore;
use crate::remote::RemoteClient;

/// Runs an engine on a fixed interval until stopped.
///
/// The first pass starts immediately. A pass that is refused by the gate is
/// skipped; the loop keeps going. Shutdown is only observed between passes.
pub struct BackgroundSync {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundSync {
    pub fn spawn<S: LocalStore, R: RemoteClient>(
        engine: Arc<SyncEngine<S, R>>,
        interval: Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                match engine.run().await {
                    Ok(result) if result.success => {
                        tracing::debug!("Background sync for {} succeeded", engine.account());
                    }
                    Ok(result) => {
                        tracing::warn!(
                            "Background sync for {} finished with {} error(s)",
                            engine.account(),
                            result.errors.len()
                        );
                    }
                    Err(GateRejection::AlreadyRunning) => {
                        tracing::debug!("Background sync skipped, a sync is in progress");
                    }
                    Err(rejection) => {
                        tracing::debug!("Background sync skipped: {rejection}");
                    }
                }

                if *shutdown_rx.borrow() {
                    break;
                }
            }
            tracing::debug!("Background sync for {} stopped", engine.account());
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the loop, waiting for the pass in flight to finish first.
    pub async fn stop(mut self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.handle.take() {
            if let Err(error) = handle.await {
                tracing::warn!("Background sync task failed: {error}");
            }
        }
    }
}

impl Drop for BackgroundSync {
    /// The loop winds down on its own after the pass in flight.
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NoteStore;
    use crate::models::NoteDraft;
    use crate::sync::testing::FakeRemote;
    use crate::sync::{StaticNetworkMonitor, SyncGate};

    #[tokio::test(flavor = "multi_thread")]
    async fn background_loop_syncs_until_stopped() {
        let store = NoteStore::open_in_memory("alice").unwrap();
        store
            .create_note(NoteDraft::from_content("background"))
            .unwrap();
        let gate = SyncGate::new(Arc::new(StaticNetworkMonitor::online()));
        let engine = Arc::new(SyncEngine::new(store.clone(), FakeRemote::new(), gate));
        let mut states = engine.subscribe();

        let background = BackgroundSync::spawn(Arc::clone(&engine), Duration::from_secs(3600));
        tokio::time::timeout(
            Duration::from_secs(5),
            states.wait_for(|state| *state == crate::state::SyncState::Synced),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(background.is_running());
        assert_eq!(store.dirty_counts().unwrap().total(), 0);

        background.stop().await;
        assert!(!engine.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_passes_do_not_stop_the_loop() {
        let monitor = Arc::new(StaticNetworkMonitor::new(crate::sync::NetworkStatus::default()));
        let store = NoteStore::open_in_memory("alice").unwrap();
        let engine = Arc::new(SyncEngine::new(
            store,
            FakeRemote::new(),
            SyncGate::new(monitor.clone()),
        ));
        let mut states = engine.subscribe();

        let background = BackgroundSync::spawn(Arc::clone(&engine), Duration::from_millis(20));
        states
            .wait_for(|state| *state == crate::state::SyncState::Offline)
            .await
            .unwrap();

        monitor.set(crate::sync::NetworkStatus {
            connected: true,
            metered: false,
        });
        tokio::time::timeout(
            Duration::from_secs(5),
            states.wait_for(|state| *state == crate::state::SyncState::Synced),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(background.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_lets_the_pass_in_flight_finish() {
        let (remote, hold) = FakeRemote::new().with_create_ack_hold();
        let remote = Arc::new(remote);
        let store = NoteStore::open_in_memory("alice").unwrap();
        let note = store
            .create_note(NoteDraft::from_content("committed before stop"))
            .unwrap();
        let gate = SyncGate::new(Arc::new(StaticNetworkMonitor::online()));
        let engine = Arc::new(SyncEngine::with_shared_remote(
            store.clone(),
            Arc::clone(&remote),
            gate,
        ));

        let background = BackgroundSync::spawn(Arc::clone(&engine), Duration::from_secs(3600));
        hold.entered().await;
        let stopping = tokio::spawn(background.stop());
        hold.release();
        tokio::time::timeout(Duration::from_secs(5), stopping)
            .await
            .unwrap()
            .unwrap();

        assert!(!engine.is_running());
        let stored = store.get_note(&note.id).unwrap().unwrap();
        assert_eq!(stored.dirty, crate::models::DirtyState::Unchanged);

        let again = engine.run().await.unwrap();
        assert!(again.success);
        assert_eq!(again.pushed, 0);
        assert_eq!(remote.notes().len(), 1);
        assert_eq!(store.all_notes().unwrap().len(), 1);
    }
}
