//! # TenantWorker: per-tenant processing loop.
//!
//! Consumes one tenant's live stream, enforces version continuity, publishes
//! every update downstream in order, and acknowledges each broker message
//! only after its publish succeeded.
//!
//! ## Flow
//! ```text
//! run()
//!   loop {
//!     ├─► process-shutdown → break
//!     ├─► tenant-stop      → break
//!     └─► next live message:
//!           ├─► decode     (failure → break, tenant dropped)
//!           ├─► apply      (failure → break; cancellation → break quietly)
//!           └─► ack        (failure → logged, broker redelivers)
//!   }
//!   stop state + remove from registry   (guaranteed cleanup)
//!
//! apply(update), V = applied_version:
//!   ├─► update_version <= V        → drop silently (duplicate / reorder)
//!   ├─► prev_update_version == V   → publish downstream, V := update_version
//!   └─► otherwise                  → recover(V, update_version), then publish
//! ```
//!
//! ## Rules
//! - Downstream publishes are strictly increasing in `update_version`.
//! - Recovered updates are published before the live update that exposed the
//!   gap; if recovery already covered the trigger, it is not published twice.
//! - Unacked messages are redelivered by the durable broker after the
//!   subscription is recreated; that is the whole retry story.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::DurableBroker;
use crate::codec::{self, ResourceUpdate};
use crate::core::recovery::RecoveryClient;
use crate::core::registry::TenantRegistry;
use crate::core::state::TenantState;
use crate::error::ReaderError;
use crate::topics;

/// Processes one tenant's live stream until stop or failure.
pub(crate) struct TenantWorker {
    state: Arc<TenantState>,
    registry: Arc<TenantRegistry>,
    durable: Arc<dyn DurableBroker>,
    recovery: RecoveryClient,
    shutdown: CancellationToken,
    indexer_topic: String,
}

impl TenantWorker {
    pub(crate) fn new(
        state: Arc<TenantState>,
        registry: Arc<TenantRegistry>,
        durable: Arc<dyn DurableBroker>,
        recovery: RecoveryClient,
        shutdown: CancellationToken,
        indexer_topic: String,
    ) -> Self {
        Self {
            state,
            registry,
            durable,
            recovery,
            shutdown,
            indexer_topic,
        }
    }

    /// Runs the live loop until shutdown, tenant stop, or a fatal error.
    ///
    /// On return the tenant's state is stopped and removed from the registry
    /// as a single guaranteed cleanup step; the next announcement or catalog
    /// scan re-creates it.
    pub(crate) async fn run(self) {
        let Some(mut live) = self.state.take_live_rx().await else {
            error!(tenant = %self.state.id(), "live channel already taken; worker exiting");
            self.finish().await;
            return;
        };

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.state.stopped() => break,
                msg = live.recv() => {
                    let Some(msg) = msg else { break };

                    let update = match codec::decode_update(&msg.payload) {
                        Ok(update) => update,
                        Err(err) => {
                            error!(
                                tenant = %self.state.id(),
                                error = %err,
                                "dropping tenant: undecodable live update"
                            );
                            break;
                        }
                    };

                    match self.apply(update).await {
                        Ok(()) => {
                            // Ack only after the publish made it downstream.
                            if let Err(err) = msg.ack.ack().await {
                                warn!(
                                    tenant = %self.state.id(),
                                    error = %err,
                                    "ack failed; the broker will redeliver"
                                );
                            }
                        }
                        Err(err) if err.is_cancellation() => break,
                        Err(err) => {
                            error!(
                                tenant = %self.state.id(),
                                error = %err,
                                "dropping tenant: update processing failed"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.finish().await;
    }

    async fn finish(&self) {
        self.state.stop().await;
        self.registry.remove(self.state.id());
        info!(tenant = %self.state.id(), "tenant worker stopped");
    }

    /// Applies one update, recovering the gap in front of it if needed.
    ///
    /// Re-entrant: recovery feeds recovered updates back through here, and a
    /// recovered update may itself trigger a nested exchange with a strictly
    /// smaller upper bound. Boxing makes the recursion explicit and finite.
    pub(crate) fn apply(&self, update: ResourceUpdate) -> BoxFuture<'_, Result<(), ReaderError>> {
        Box::pin(async move {
            let applied = self.state.applied_version();
            if update.update_version <= applied {
                // Duplicate or reorder, already published.
                return Ok(());
            }

            if update.prev_update_version != applied {
                self.recovery
                    .recover(self, &self.state, applied, update.update_version)
                    .await?;
                if update.update_version <= self.state.applied_version() {
                    // The exchange already carried this update downstream.
                    return Ok(());
                }
            }

            self.publish_downstream(&update).await
        })
    }

    async fn publish_downstream(&self, update: &ResourceUpdate) -> Result<(), ReaderError> {
        let routing_key = self.state.routing_key().await;
        let subject = topics::indexer_subject(&self.indexer_topic, &routing_key);
        let payload = codec::encode_update(update)?;

        debug!(
            tenant = %self.state.id(),
            subject = %subject,
            version = update.update_version,
            "publishing update to indexer"
        );
        self.durable.publish(&subject, payload.into()).await?;

        self.state.set_applied(update.update_version);
        Ok(())
    }
}
