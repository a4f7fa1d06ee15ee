//! # Supervisor: orchestrates tenant workers and graceful shutdown.
//!
//! The [`Supervisor`] owns the shared runtime pieces (brokers, catalog,
//! registry, the process-wide stop token) and drives the tenant lifecycle
//! from startup to shutdown.
//!
//! - Walk the catalog at startup and start a worker per connected tenant
//! - Listen for tenant-connected announcements and start workers for arrivals
//! - Refresh the routing key in place when a known tenant reconnects
//! - Fire the process-wide stop signal exactly once
//!
//! ## Architecture
//! ```text
//! Supervisor::new()
//!       │
//!       ├──► announcement listener (plain broker)
//!       │         └──► ensure(id, routing_key) per announcement
//!       │
//!       ├──► catalog walk
//!       │         └──► ensure(id, routing_key) per connected tenant
//!       │
//!       └──► ensure():
//!             ├──► known tenant  → refresh routing key, done
//!             └──► new tenant    → subscribe live topic (manual ack)
//!                                  → insert into registry
//!                                  → spawn TenantWorker
//! ```
//!
//! ## Rules
//! - Catalog failure or an `ensure` failure during the walk aborts startup.
//! - Announcement decode failures and per-tenant `ensure` failures are
//!   logged and skipped; the next announcement retries.
//! - `stop()` is idempotent; every worker observes the token and terminates.
//! - Workers clean their own registry entries on exit, so a tenant is tracked
//!   iff its worker is running, modulo the start/stop transition itself.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{Catalog, DurableBroker, Inbox, PlainBroker};
use crate::codec;
use crate::config::Config;
use crate::core::recovery::RecoveryClient;
use crate::core::registry::TenantRegistry;
use crate::core::state::TenantState;
use crate::core::worker::TenantWorker;
use crate::error::ReaderError;
use crate::topics;

/// Orchestrates tenant workers: startup, dynamic arrivals, shutdown.
pub struct Supervisor {
    cfg: Config,
    catalog: Arc<dyn Catalog>,
    durable: Arc<dyn DurableBroker>,
    plain: Arc<dyn PlainBroker>,
    registry: Arc<TenantRegistry>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("cfg", &self.cfg)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Builds the supervisor and brings it to a running state.
    ///
    /// ### Startup flow
    /// - Spawn the announcement listener (arrivals are not missed while the
    ///   catalog walk runs)
    /// - Query the catalog for connected tenants and `ensure` each
    ///
    /// A catalog failure, or an `ensure` failure during the walk, fires the
    /// stop signal and returns the error; the process is expected to abort.
    pub async fn new(
        cfg: Config,
        catalog: Arc<dyn Catalog>,
        durable: Arc<dyn DurableBroker>,
        plain: Arc<dyn PlainBroker>,
    ) -> Result<Arc<Self>, ReaderError> {
        let supervisor = Arc::new(Self {
            cfg,
            catalog,
            durable,
            plain,
            registry: Arc::new(TenantRegistry::new()),
            shutdown: CancellationToken::new(),
        });

        supervisor.clone().spawn_announcement_listener();

        if let Err(err) = supervisor.load_connected().await {
            error!(error = %err, "failed to load connected tenants");
            supervisor.stop();
            return Err(err);
        }

        Ok(supervisor)
    }

    /// Fires the process-wide stop signal. Idempotent.
    ///
    /// Every tenant worker and the announcement listener observe the token
    /// and terminate; workers remove their registry entries on the way out.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Returns true while a worker is tracked for the tenant.
    pub fn is_tracking(&self, id: Uuid) -> bool {
        self.registry.lookup(id).is_some()
    }

    /// Starts tracking a tenant, or refreshes the routing key of a tracked one.
    ///
    /// Idempotent: a known tenant keeps its single live subscription and only
    /// has its routing key updated in place. For a new tenant, a live
    /// subscription failure stops the half-built state and returns the error
    /// without inserting anything.
    pub async fn ensure(&self, id: Uuid, routing_key: String) -> Result<(), ReaderError> {
        if let Some(existing) = self.registry.lookup(id) {
            debug!(tenant = %id, "already tracking tenant; refreshing routing key");
            existing.set_routing_key(routing_key).await;
            return Ok(());
        }

        let state = Arc::new(TenantState::new(id, routing_key));
        let subject = topics::live_topic(&self.cfg.live_topic_prefix, id);
        info!(tenant = %id, subject = %subject, "subscribing to live updates");
        match self
            .durable
            .subscribe(&subject, self.cfg.live_channel_capacity)
            .await
        {
            Ok(sub) => state.attach_live(sub).await,
            Err(err) => {
                state.stop().await;
                return Err(err.into());
            }
        }

        self.registry.insert(id, Arc::clone(&state));

        let worker = TenantWorker::new(
            state,
            Arc::clone(&self.registry),
            Arc::clone(&self.durable),
            self.recovery_client(),
            self.shutdown.clone(),
            self.cfg.indexer_topic.clone(),
        );
        tokio::spawn(worker.run());
        Ok(())
    }

    /// Stops tracking a tenant and releases its subscription.
    ///
    /// Intended for callers that observe tenant disconnects out of band; the
    /// reader itself never detaches tenants before process stop.
    pub async fn detach(&self, id: Uuid) -> Result<(), ReaderError> {
        match self.registry.lookup(id) {
            Some(state) => {
                state.stop().await;
                self.registry.remove(id);
                Ok(())
            }
            None => Err(ReaderError::TenantUnknown { id }),
        }
    }

    fn recovery_client(&self) -> RecoveryClient {
        RecoveryClient::new(
            Arc::clone(&self.plain),
            self.shutdown.clone(),
            self.cfg.recovery_window,
            self.cfg.response_queue_capacity,
            self.cfg.request_topic_prefix.clone(),
            self.cfg.response_topic_prefix.clone(),
        )
    }

    async fn load_connected(&self) -> Result<(), ReaderError> {
        let tenants = self.catalog.connected_tenants().await?;
        for tenant in tenants {
            self.ensure(tenant.id, tenant.routing_key).await?;
        }
        Ok(())
    }

    /// Spawns the background task consuming tenant-connected announcements.
    ///
    /// A subscribe failure is logged and the listener gives up: already
    /// connected tenants are still picked up by the catalog walk, and the
    /// process operator decides whether running without arrivals is viable.
    fn spawn_announcement_listener(self: Arc<Self>) {
        tokio::spawn(async move {
            let subject = self.cfg.announce_subject.clone();
            let inbox = match self
                .plain
                .subscribe(&subject, self.cfg.live_channel_capacity)
                .await
            {
                Ok(inbox) => inbox,
                Err(err) => {
                    error!(error = %err, "failed to listen for tenant announcements");
                    return;
                }
            };
            let Inbox {
                mut messages,
                handle,
            } = inbox;

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("shutdown signaled; announcement listener exiting");
                        break;
                    }
                    msg = messages.recv() => {
                        let Some(payload) = msg else { break };

                        let announcement = match codec::decode_announcement(&payload) {
                            Ok(a) => a,
                            Err(err) => {
                                error!(error = %err, "could not decode tenant announcement");
                                continue;
                            }
                        };

                        info!(
                            tenant = %announcement.tenant_id,
                            routing_key = %announcement.routing_key,
                            "tenant connected"
                        );
                        if let Err(err) = self
                            .ensure(announcement.tenant_id, announcement.routing_key)
                            .await
                        {
                            error!(
                                tenant = %announcement.tenant_id,
                                error = %err,
                                "could not start listening to tenant updates"
                            );
                        }
                    }
                }
            }

            if let Err(err) = handle.unsubscribe().await {
                warn!(error = %err, "announcement unsubscribe failed");
            }
        });
    }
}
