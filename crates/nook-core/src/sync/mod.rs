//! Synchronization engine
//!
//! A sync pass pushes every locally dirty note to the remote service as an
//! independent task, waits for all of them to settle, then downloads the
//! remote note list once and reconciles it with the local store.

mod gate;
mod policy;
mod scheduler;
mod session;
mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use gate::{
    GateRejection, NetworkMonitor, NetworkStatus, Permit, RunningGuard, StaticNetworkMonitor,
    SyncGate,
};
pub use policy::{
    apply_acknowledgment, plan_reconciliation, push_action, AckOutcome, PushAction, ReconcilePlan,
};
pub use scheduler::BackgroundSync;
pub use session::{
    FailureKind, OperationKind, OperationTracker, SyncEngine, SyncFailure, SyncResult,
};
pub use store::LocalStore;
