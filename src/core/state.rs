//! # Per-tenant runtime state.
//!
//! [`TenantState`] is the record the registry owns for each tracked tenant:
//! identity, the highest version published downstream, the downstream routing
//! key, the live subscription, and the per-tenant stop signal.
//!
//! ## Rules
//! - `applied_version` is written only by the tenant's worker and its
//!   recovery exchanges; both run on the same task, readers may race.
//! - `routing_key` is mutable: a reconnect announcement refreshes it in place.
//! - `stop()` is idempotent. It fires the stop token and releases the live
//!   subscription exactly once; later calls are no-ops.
//! - The live receiver is parked here until the worker takes it; it can be
//!   taken once.

use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::broker::{LiveMessage, LiveSubscription, SubscriptionHandle};

/// State of one tracked tenant.
pub(crate) struct TenantState {
    /// Stable tenant identifier.
    id: Uuid,
    /// Suffix of the downstream indexer subject; refreshed on reconnect.
    routing_key: RwLock<String>,
    /// Highest `update_version` successfully published downstream.
    applied_version: AtomicI64,
    /// Handle of the live subscription, released once by `stop`.
    live_sub: Mutex<Option<Box<dyn SubscriptionHandle>>>,
    /// Inbound live channel, parked until the worker takes it.
    live_rx: Mutex<Option<mpsc::Receiver<LiveMessage>>>,
    /// Per-tenant stop signal.
    stop: CancellationToken,
}

impl TenantState {
    pub(crate) fn new(id: Uuid, routing_key: String) -> Self {
        Self {
            id,
            routing_key: RwLock::new(routing_key),
            applied_version: AtomicI64::new(0),
            live_sub: Mutex::new(None),
            live_rx: Mutex::new(None),
            stop: CancellationToken::new(),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// Stores the live subscription created by the supervisor.
    pub(crate) async fn attach_live(&self, sub: LiveSubscription) {
        *self.live_sub.lock().await = Some(sub.handle);
        *self.live_rx.lock().await = Some(sub.messages);
    }

    /// Hands the live receiver to the worker. Returns `None` if already taken.
    pub(crate) async fn take_live_rx(&self) -> Option<mpsc::Receiver<LiveMessage>> {
        self.live_rx.lock().await.take()
    }

    pub(crate) async fn routing_key(&self) -> String {
        self.routing_key.read().await.clone()
    }

    pub(crate) async fn set_routing_key(&self, routing_key: String) {
        *self.routing_key.write().await = routing_key;
    }

    pub(crate) fn applied_version(&self) -> i64 {
        self.applied_version.load(Ordering::Acquire)
    }

    /// Records a successful downstream publish.
    pub(crate) fn set_applied(&self, version: i64) {
        self.applied_version.store(version, Ordering::Release);
    }

    /// Advances `applied_version` to `version` if that moves it forward.
    ///
    /// Used by recovery to skip over ranges the producer no longer retains.
    pub(crate) fn advance_applied(&self, version: i64) {
        self.applied_version.fetch_max(version, Ordering::AcqRel);
    }

    /// Completes when the per-tenant stop signal fires.
    pub(crate) async fn stopped(&self) {
        self.stop.cancelled().await;
    }

    /// Fires the stop signal and releases the live subscription.
    ///
    /// Safe to call from the worker's cleanup and from `Supervisor::detach`
    /// concurrently; the subscription is released by whichever call takes
    /// the handle first.
    pub(crate) async fn stop(&self) {
        self.stop.cancel();
        if let Some(handle) = self.live_sub.lock().await.take() {
            if let Err(err) = handle.unsubscribe().await {
                tracing::warn!(tenant = %self.id, error = %err, "live unsubscribe failed");
            }
        }
    }
}
