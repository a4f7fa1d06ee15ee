//! # Broker and catalog seams.
//!
//! The reader never talks to a concrete transport. It consumes three trait
//! objects, injected at construction:
//!
//! - **[`DurableBroker`]** — at-least-once pub/sub with manual acknowledgement
//!   and redelivery of unacked messages. Carries the live update streams in
//!   and the indexer publishes out.
//! - **[`PlainBroker`]** — fire-and-forget pub/sub. Carries tenant-connected
//!   announcements and the recovery request/response side channel.
//! - **[`Catalog`]** — read-only listing of currently connected tenants,
//!   used once at startup.
//!
//! ## Architecture
//! ```text
//! DurableBroker::subscribe ──► LiveSubscription { messages, handle }
//!                                   │                    │
//!                                   ▼                    ▼
//!                          bounded mpsc of         released exactly once
//!                          LiveMessage (ack)       by TenantState::stop
//!
//! PlainBroker::subscribe ──► Inbox { messages, handle }
//!                                   (scoped to one recovery call)
//! ```
//!
//! ## Rules
//! - Implementations must be shareable across all tenant workers (`Send + Sync`).
//! - Subscriptions deliver through **bounded** channels; a full channel means
//!   the broker side decides whether to block or drop, per its own semantics.
//! - Acknowledgement is **manual and explicit**: the worker acks only after a
//!   successful downstream publish.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{BrokerError, CatalogError};

/// Manual acknowledgement token for one durable message.
///
/// Consumed on use; an unacked message is redelivered by the durable broker
/// once the subscription is recreated.
#[async_trait]
pub trait AckToken: Send {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
}

/// Releases a subscription on the broker.
///
/// Consumed on use. Dropping the handle without calling `unsubscribe` leaves
/// the release to the implementation's own cleanup.
#[async_trait]
pub trait SubscriptionHandle: Send + Sync {
    async fn unsubscribe(self: Box<Self>) -> Result<(), BrokerError>;
}

/// One message delivered on a durable live subscription.
pub struct LiveMessage {
    pub payload: Bytes,
    pub ack: Box<dyn AckToken>,
}

/// A durable live subscription: a bounded message channel plus the handle
/// that releases it.
pub struct LiveSubscription {
    pub messages: mpsc::Receiver<LiveMessage>,
    pub handle: Box<dyn SubscriptionHandle>,
}

/// A per-call inbox on the plain broker.
pub struct Inbox {
    pub messages: mpsc::Receiver<Bytes>,
    pub handle: Box<dyn SubscriptionHandle>,
}

/// Durable streaming broker: at-least-once, manual acknowledgement.
#[async_trait]
pub trait DurableBroker: Send + Sync + 'static {
    /// Subscribes to `subject` in manual-acknowledgement mode, delivering
    /// into a channel of the given capacity.
    async fn subscribe(
        &self,
        subject: &str,
        capacity: usize,
    ) -> Result<LiveSubscription, BrokerError>;

    /// Publishes `payload` to `subject`.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BrokerError>;
}

/// Plain pub/sub broker: best-effort, no persistence.
#[async_trait]
pub trait PlainBroker: Send + Sync + 'static {
    /// Subscribes to `subject`, delivering into a channel of the given capacity.
    async fn subscribe(&self, subject: &str, capacity: usize) -> Result<Inbox, BrokerError>;

    /// Publishes `payload` to `subject`.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BrokerError>;
}

/// One row of the tenant catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRecord {
    pub id: Uuid,
    pub routing_key: String,
}

/// Read-only view of the tenant catalog.
#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    /// Returns every tenant whose status is neither disconnected nor unknown.
    async fn connected_tenants(&self) -> Result<Vec<TenantRecord>, CatalogError>;
}
