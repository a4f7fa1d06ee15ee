//! # Missing-range recovery exchange.
//!
//! When the worker detects a version gap it runs one recovery exchange:
//! request the missing range from the tenant over the plain broker, apply
//! the response batches, and hand control back to the live stream.
//!
//! ## Flow
//! ```text
//! recover(from, to)
//!   ├─► subscribe response_topic(tenant)   (per-call inbox)
//!   ├─► publish MissingRangeRequest{from, to}
//!   └─► loop {
//!         ├─► process-shutdown          → Err(Shutdown)
//!         ├─► tenant-stop               → Err(TenantStopped)
//!         ├─► inactivity window elapsed → Ok, applied_version unchanged
//!         └─► response batch:
//!               ├─► empty updates → applied_version := max(V, first_available - 1), done
//!               ├─► truncated at the retained window
//!               │     → applied_version := max(V, first.prev_update_version)
//!               ├─► apply each update via the worker (re-entrant)
//!               └─► done when last applied == to or == last_available
//!       }
//!   (inbox released on every exit path)
//! ```
//!
//! ## Rules
//! - The inactivity window restarts on every batch; a silent responder costs
//!   one window, after which the live stream retries the gap on its next
//!   message.
//! - A failed inbox subscribe is logged and the exchange proceeds without an
//!   inbox, so the window is the only way out. The request may still reach a
//!   responder, but nothing can be heard back.
//! - Recovered updates may themselves expose gaps; the nested exchange is
//!   bounded by a strictly smaller `to`, so the recursion is finite.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::PlainBroker;
use crate::codec::{self, MissingRangeRequest, MissingRangeResponse};
use crate::core::state::TenantState;
use crate::core::worker::TenantWorker;
use crate::error::ReaderError;
use crate::topics;

/// Executes the missing-range sub-protocol for one tenant worker.
pub(crate) struct RecoveryClient {
    plain: Arc<dyn PlainBroker>,
    shutdown: CancellationToken,
    window: Duration,
    queue_capacity: usize,
    request_topic_prefix: String,
    response_topic_prefix: String,
}

impl RecoveryClient {
    pub(crate) fn new(
        plain: Arc<dyn PlainBroker>,
        shutdown: CancellationToken,
        window: Duration,
        queue_capacity: usize,
        request_topic_prefix: String,
        response_topic_prefix: String,
    ) -> Self {
        Self {
            plain,
            shutdown,
            window,
            queue_capacity,
            request_topic_prefix,
            response_topic_prefix,
        }
    }

    /// Recovers the updates with `from < update_version <= to` and applies
    /// them through `worker` in order.
    ///
    /// Returns `Ok(())` both when the gap closed and when the window elapsed
    /// with nothing heard; the caller re-checks `applied_version` either way.
    pub(crate) async fn recover(
        &self,
        worker: &TenantWorker,
        state: &TenantState,
        from: i64,
        to: i64,
    ) -> Result<(), ReaderError> {
        info!(tenant = %state.id(), from, to, "requesting missing updates");

        let subject = topics::response_topic(&self.response_topic_prefix, state.id());
        let (rx, handle) = match self.plain.subscribe(&subject, self.queue_capacity).await {
            Ok(inbox) => (Some(inbox.messages), Some(inbox.handle)),
            Err(err) => {
                warn!(
                    tenant = %state.id(),
                    error = %err,
                    "response inbox subscribe failed; relying on the inactivity window"
                );
                (None, None)
            }
        };

        let result = self.exchange(worker, state, from, to, rx).await;

        if let Some(handle) = handle {
            if let Err(err) = handle.unsubscribe().await {
                warn!(tenant = %state.id(), error = %err, "response inbox unsubscribe failed");
            }
        }
        result
    }

    async fn exchange(
        &self,
        worker: &TenantWorker,
        state: &TenantState,
        from: i64,
        to: i64,
        mut rx: Option<mpsc::Receiver<Bytes>>,
    ) -> Result<(), ReaderError> {
        let request = codec::encode_request(
            state.id(),
            &MissingRangeRequest {
                from_version: from,
                to_version: to,
            },
        )?;
        let request_subject = topics::request_topic(&self.request_topic_prefix, state.id());
        self.plain
            .publish(&request_subject, request.into())
            .await?;

        loop {
            let payload = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(ReaderError::Shutdown),
                _ = state.stopped() => return Err(ReaderError::TenantStopped),
                received = time::timeout(self.window, recv_or_pending(&mut rx)) => {
                    match received {
                        Err(_elapsed) => {
                            debug!(
                                tenant = %state.id(),
                                to,
                                "no response within the inactivity window; leaving the gap to the live stream"
                            );
                            return Ok(());
                        }
                        // Inbox closed; keep waiting out the window.
                        Ok(None) => {
                            rx = None;
                            continue;
                        }
                        Ok(Some(payload)) => payload,
                    }
                }
            };

            let response = codec::decode_response(&payload)?;
            if self.apply_batch(worker, state, to, response).await? {
                return Ok(());
            }
        }
    }

    /// Applies one response batch. Returns `true` when the exchange is done.
    async fn apply_batch(
        &self,
        worker: &TenantWorker,
        state: &TenantState,
        to: i64,
        response: MissingRangeResponse,
    ) -> Result<bool, ReaderError> {
        if response.updates.is_empty() {
            // Caught up to the producer's retained window; any still-missing
            // prefix is unrecoverable and must be skipped.
            state.advance_applied(response.first_available - 1);
            return Ok(true);
        }

        let first = &response.updates[0];
        if first.update_version == response.first_available {
            // The batch starts at the retained-window boundary: skip the lost
            // prefix so the continuity check does not re-trigger recovery.
            state.advance_applied(first.prev_update_version);
        }

        let last_version = response.updates.last().map(|u| u.update_version);
        for update in response.updates {
            worker.apply(update).await?;
        }

        Ok(last_version == Some(to) || last_version == Some(response.last_available))
    }
}

async fn recv_or_pending(rx: &mut Option<mpsc::Receiver<Bytes>>) -> Option<Bytes> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
