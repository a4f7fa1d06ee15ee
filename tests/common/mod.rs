//! In-memory broker and catalog doubles shared by the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use metavisor::broker::{
    AckToken, Catalog, DurableBroker, Inbox, LiveMessage, LiveSubscription, PlainBroker,
    SubscriptionHandle, TenantRecord,
};
use metavisor::{BrokerError, CatalogError, ResourceUpdate};

pub struct NoopHandle;

#[async_trait]
impl SubscriptionHandle for NoopHandle {
    async fn unsubscribe(self: Box<Self>) -> Result<(), BrokerError> {
        Ok(())
    }
}

struct RecordingAck {
    tag: i64,
    log: Arc<Mutex<Vec<i64>>>,
}

#[async_trait]
impl AckToken for RecordingAck {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.log.lock().unwrap().push(self.tag);
        Ok(())
    }
}

/// Plain pub/sub: fan-out to every current subscriber, nothing persisted.
#[derive(Default)]
pub struct MemoryPlain {
    subs: Mutex<HashMap<String, Vec<mpsc::Sender<Bytes>>>>,
    published: Mutex<Vec<(String, Bytes)>>,
}

impl MemoryPlain {
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.subs
            .lock()
            .unwrap()
            .get(subject)
            .map_or(0, |senders| senders.len())
    }

    /// How many messages were published to `subject`.
    pub fn publish_count(&self, subject: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == subject)
            .count()
    }
}

#[async_trait]
impl PlainBroker for MemoryPlain {
    async fn subscribe(&self, subject: &str, capacity: usize) -> Result<Inbox, BrokerError> {
        let (tx, rx) = mpsc::channel(capacity);
        self.subs
            .lock()
            .unwrap()
            .entry(subject.to_string())
            .or_default()
            .push(tx);
        Ok(Inbox {
            messages: rx,
            handle: Box::new(NoopHandle),
        })
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload.clone()));
        let senders = self
            .subs
            .lock()
            .unwrap()
            .get(subject)
            .cloned()
            .unwrap_or_default();
        for tx in senders {
            let _ = tx.try_send(payload.clone());
        }
        Ok(())
    }
}

/// Durable broker double: one feed per subject, recorded publishes and acks.
#[derive(Default)]
pub struct MemoryDurable {
    feeds: Mutex<HashMap<String, mpsc::Sender<LiveMessage>>>,
    subscribe_counts: Mutex<HashMap<String, usize>>,
    published: Mutex<Vec<(String, Bytes)>>,
    fail_subscribe: AtomicBool,
    fail_publish: AtomicBool,
    acked: Arc<Mutex<Vec<i64>>>,
}

impl MemoryDurable {
    /// Pushes one live message into the subject's feed. The `tag` shows up in
    /// [`acked`](Self::acked) when the worker acknowledges the message.
    pub async fn deliver(&self, subject: &str, payload: Vec<u8>, tag: i64) {
        let tx = self
            .feeds
            .lock()
            .unwrap()
            .get(subject)
            .cloned()
            .expect("no live subscription for subject");
        tx.send(LiveMessage {
            payload: payload.into(),
            ack: Box::new(RecordingAck {
                tag,
                log: Arc::clone(&self.acked),
            }),
        })
        .await
        .expect("live channel closed");
    }

    pub fn subscribe_count(&self, subject: &str) -> usize {
        self.subscribe_counts
            .lock()
            .unwrap()
            .get(subject)
            .copied()
            .unwrap_or(0)
    }

    /// Versions published to `subject`, in publish order.
    pub fn published_versions(&self, subject: &str) -> Vec<i64> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, payload)| {
                let update: ResourceUpdate =
                    serde_json::from_slice(payload).expect("indexer payload is a bare update");
                update.update_version
            })
            .collect()
    }

    pub fn acked(&self) -> Vec<i64> {
        self.acked.lock().unwrap().clone()
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DurableBroker for MemoryDurable {
    async fn subscribe(
        &self,
        subject: &str,
        capacity: usize,
    ) -> Result<LiveSubscription, BrokerError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BrokerError::Subscribe {
                subject: subject.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(capacity);
        self.feeds.lock().unwrap().insert(subject.to_string(), tx);
        *self
            .subscribe_counts
            .lock()
            .unwrap()
            .entry(subject.to_string())
            .or_insert(0) += 1;
        Ok(LiveSubscription {
            messages: rx,
            handle: Box::new(NoopHandle),
        })
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BrokerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish {
                subject: subject.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload));
        Ok(())
    }
}

/// Catalog double returning a fixed tenant listing.
#[derive(Default)]
pub struct StaticCatalog {
    pub records: Vec<TenantRecord>,
    pub fail: bool,
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn connected_tenants(&self) -> Result<Vec<TenantRecord>, CatalogError> {
        if self.fail {
            return Err(CatalogError {
                reason: "injected failure".to_string(),
            });
        }
        Ok(self.records.clone())
    }
}

// ---- Wire helpers ----

pub fn update_envelope(tenant: Uuid, prev: i64, version: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "tenant_id": tenant,
        "kind": "update",
        "body": {
            "update_version": version,
            "prev_update_version": prev,
            "payload": [],
        },
    }))
    .unwrap()
}

pub fn response_envelope(
    tenant: Uuid,
    updates: &[(i64, i64)],
    first_available: i64,
    last_available: i64,
) -> Vec<u8> {
    let updates: Vec<_> = updates
        .iter()
        .map(|(prev, version)| {
            serde_json::json!({
                "update_version": version,
                "prev_update_version": prev,
                "payload": [],
            })
        })
        .collect();
    serde_json::to_vec(&serde_json::json!({
        "tenant_id": tenant,
        "kind": "missing_range_response",
        "body": {
            "updates": updates,
            "first_available": first_available,
            "last_available": last_available,
        },
    }))
    .unwrap()
}

pub fn announcement(tenant: Uuid, routing_key: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "tenant_id": tenant,
        "routing_key": routing_key,
    }))
    .unwrap()
}

/// Subscribes the responder's inbox now, then answers every request on
/// `updates.request.<tenant>` with the canned response batches.
pub async fn spawn_responder(plain: &Arc<MemoryPlain>, tenant: Uuid, responses: Vec<Vec<u8>>) {
    let mut inbox = plain
        .subscribe(&format!("updates.request.{tenant}"), 16)
        .await
        .unwrap();
    let plain = Arc::clone(plain);
    tokio::spawn(async move {
        while inbox.messages.recv().await.is_some() {
            for response in &responses {
                plain
                    .publish(
                        &format!("updates.response.{tenant}"),
                        Bytes::from(response.clone()),
                    )
                    .await
                    .unwrap();
            }
        }
    });
}

/// Polls `cond` under paused time until it holds.
///
/// The step is large enough that auto-advanced time walks past the recovery
/// inactivity window well before the iteration cap.
pub async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
    panic!("condition not reached in time");
}
