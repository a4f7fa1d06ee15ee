//! # Wire codec for tenant-scoped envelopes.
//!
//! Every message exchanged with a tenant travels inside an envelope carrying
//! the tenant id and a payload kind tag. The codec checks the tag before
//! touching the body, which is what separates the two decode failures:
//!
//! - [`CodecError::Malformed`] the envelope or body could not be parsed;
//! - [`CodecError::UnexpectedPayload`] the envelope parsed but carries a
//!   different payload kind than the caller asked for.
//!
//! Tenant-connected announcements are not envelope-wrapped; they are decoded
//! directly from the announcement subject's payload.
//!
//! ## Rules
//! - Decoding never panics on untrusted input.
//! - The downstream indexer receives the re-encoded [`ResourceUpdate`] alone,
//!   without the envelope.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::error::CodecError;

/// A single resource update in a tenant's version chain.
///
/// `update_version` increases strictly and is unique per tenant;
/// `prev_update_version` links to the immediately preceding update, with
/// zero or a negative value meaning "no predecessor". The payload is an
/// opaque blob forwarded verbatim downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUpdate {
    pub update_version: i64,
    pub prev_update_version: i64,
    #[serde(default)]
    pub payload: Vec<u8>,
}

/// Request for the updates with `from_version < update_version <= to_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRangeRequest {
    pub from_version: i64,
    pub to_version: i64,
}

/// One batch of recovered updates.
///
/// The producer may serve only a suffix of the requested range if it has
/// discarded older entries; `first_available` and `last_available` describe
/// the retained window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRangeResponse {
    pub updates: Vec<ResourceUpdate>,
    pub first_available: i64,
    pub last_available: i64,
}

/// Payload of a tenant-connected announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConnected {
    pub tenant_id: Uuid,
    pub routing_key: String,
}

/// Type tag carried by the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Update,
    MissingRangeRequest,
    MissingRangeResponse,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayloadKind::Update => "update",
            PayloadKind::MissingRangeRequest => "missing_range_request",
            PayloadKind::MissingRangeResponse => "missing_range_response",
        };
        f.write_str(s)
    }
}

#[derive(Deserialize)]
struct EnvelopeRef<'a> {
    #[allow(dead_code)]
    tenant_id: Uuid,
    kind: PayloadKind,
    #[serde(borrow)]
    body: &'a RawValue,
}

#[derive(Serialize)]
struct Envelope<T> {
    tenant_id: Uuid,
    kind: PayloadKind,
    body: T,
}

fn open_envelope(data: &[u8], expected: PayloadKind) -> Result<EnvelopeRef<'_>, CodecError> {
    let envelope: EnvelopeRef<'_> =
        serde_json::from_slice(data).map_err(|source| CodecError::Malformed { source })?;
    if envelope.kind != expected {
        return Err(CodecError::UnexpectedPayload {
            expected,
            found: envelope.kind,
        });
    }
    Ok(envelope)
}

/// Decodes a live update from its tenant envelope.
pub fn decode_update(data: &[u8]) -> Result<ResourceUpdate, CodecError> {
    let envelope = open_envelope(data, PayloadKind::Update)?;
    serde_json::from_str(envelope.body.get()).map_err(|source| CodecError::Malformed { source })
}

/// Decodes a missing-range response batch from its tenant envelope.
pub fn decode_response(data: &[u8]) -> Result<MissingRangeResponse, CodecError> {
    let envelope = open_envelope(data, PayloadKind::MissingRangeResponse)?;
    serde_json::from_str(envelope.body.get()).map_err(|source| CodecError::Malformed { source })
}

/// Wraps a missing-range request in an envelope addressed to `tenant_id`.
pub fn encode_request(
    tenant_id: Uuid,
    request: &MissingRangeRequest,
) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&Envelope {
        tenant_id,
        kind: PayloadKind::MissingRangeRequest,
        body: request,
    })
    .map_err(|source| CodecError::Encode { source })
}

/// Re-encodes an update for the downstream indexer.
pub fn encode_update(update: &ResourceUpdate) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(update).map_err(|source| CodecError::Encode { source })
}

/// Decodes a tenant-connected announcement.
pub fn decode_announcement(data: &[u8]) -> Result<TenantConnected, CodecError> {
    serde_json::from_slice(data).map_err(|source| CodecError::Malformed { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(kind: PayloadKind, body: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "tenant_id": Uuid::nil(),
            "kind": kind,
            "body": body,
        }))
        .unwrap()
    }

    #[test]
    fn decodes_an_enveloped_update() {
        let data = wrap(
            PayloadKind::Update,
            serde_json::json!({
                "update_version": 7,
                "prev_update_version": 6,
                "payload": [1, 2, 3],
            }),
        );
        let update = decode_update(&data).unwrap();
        assert_eq!(update.update_version, 7);
        assert_eq!(update.prev_update_version, 6);
        assert_eq!(update.payload, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_a_mismatched_payload_kind() {
        let data = wrap(
            PayloadKind::MissingRangeResponse,
            serde_json::json!({ "updates": [], "first_available": 0, "last_available": 0 }),
        );
        let err = decode_update(&data).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnexpectedPayload {
                expected: PayloadKind::Update,
                found: PayloadKind::MissingRangeResponse,
            }
        ));
    }

    #[test]
    fn rejects_garbage_as_malformed() {
        let err = decode_update(b"not json at all").unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));

        // Valid envelope, broken body.
        let data = wrap(PayloadKind::Update, serde_json::json!({ "update_version": "x" }));
        let err = decode_update(&data).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));
    }

    #[test]
    fn request_round_trips_through_its_envelope() {
        let id = Uuid::from_u128(42);
        let encoded = encode_request(
            id,
            &MissingRangeRequest {
                from_version: 3,
                to_version: 9,
            },
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value["tenant_id"], serde_json::json!(id));
        assert_eq!(value["kind"], "missing_range_request");
        assert_eq!(value["body"]["from_version"], 3);
        assert_eq!(value["body"]["to_version"], 9);
    }

    #[test]
    fn decodes_a_bare_announcement() {
        let id = Uuid::from_u128(7);
        let data = serde_json::to_vec(&serde_json::json!({
            "tenant_id": id,
            "routing_key": "k8s-a",
        }))
        .unwrap();
        let ann = decode_announcement(&data).unwrap();
        assert_eq!(ann.tenant_id, id);
        assert_eq!(ann.routing_key, "k8s-a");
    }
}
