//! # Subject derivation.
//!
//! All broker subjects are derived here, deterministically, from the
//! configured prefixes. Per-tenant subjects append the tenant id as the
//! final token; the indexer subject appends the tenant's routing key.

use uuid::Uuid;

/// Subject of a tenant's durable live update stream.
pub fn live_topic(prefix: &str, id: Uuid) -> String {
    format!("{prefix}.{id}")
}

/// Subject a tenant listens on for missing-range requests.
pub fn request_topic(prefix: &str, id: Uuid) -> String {
    format!("{prefix}.{id}")
}

/// Subject a tenant replies on with missing-range responses.
pub fn response_topic(prefix: &str, id: Uuid) -> String {
    format!("{prefix}.{id}")
}

/// Subject the downstream indexer consumes for a given routing key.
pub fn indexer_subject(indexer_topic: &str, routing_key: &str) -> String {
    format!("{indexer_topic}.{routing_key}")
}
