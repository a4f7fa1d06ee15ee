//! # Error types used by the reader runtime and the wire codec.
//!
//! This module defines the error taxonomy of the crate:
//!
//! - [`CodecError`] failures while encoding or decoding wire envelopes.
//! - [`BrokerError`] failures surfaced by broker implementations behind the trait seams.
//! - [`CatalogError`] failures while querying the tenant catalog.
//! - [`ReaderError`] the umbrella error returned by runtime operations.
//!
//! All types provide `as_label` helpers for metrics. [`ReaderError`] additionally
//! provides `is_cancellation()`: the `Shutdown` and `TenantStopped` variants are
//! internal wake signals, not faults, and must never be surfaced to outside callers.

use thiserror::Error;
use uuid::Uuid;

use crate::codec::PayloadKind;

/// # Errors produced by the wire codec.
///
/// `Malformed` and `UnexpectedPayload` indicate an upstream contract violation
/// and are fatal for the tenant that produced them. `Encode` indicates a local
/// programming bug and is never retried.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodecError {
    /// The outer envelope or the inner body could not be parsed.
    #[error("malformed message: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },

    /// The envelope parsed, but its payload kind does not match the expected schema.
    #[error("unexpected payload: expected {expected}, found {found}")]
    UnexpectedPayload {
        /// The payload kind the caller asked for.
        expected: PayloadKind,
        /// The payload kind carried by the envelope.
        found: PayloadKind,
    },

    /// Serialization failed while building an outgoing message.
    #[error("failed to encode message: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

impl CodecError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CodecError::Malformed { .. } => "codec_malformed",
            CodecError::UnexpectedPayload { .. } => "codec_unexpected_payload",
            CodecError::Encode { .. } => "codec_encode",
        }
    }
}

/// # Errors surfaced by broker implementations.
///
/// The crate talks to brokers only through the seams in [`crate::broker`];
/// implementations map their transport errors into these variants.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The broker connection is gone and will not come back.
    #[error("broker connection closed")]
    Closed,

    /// A subscription could not be established.
    #[error("subscribe to '{subject}' failed: {reason}")]
    Subscribe { subject: String, reason: String },

    /// A publish was rejected or lost before hand-off to the broker.
    #[error("publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },

    /// A manual acknowledgement could not be delivered.
    #[error("acknowledge failed: {reason}")]
    Ack { reason: String },
}

impl BrokerError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Closed => "broker_closed",
            BrokerError::Subscribe { .. } => "broker_subscribe",
            BrokerError::Publish { .. } => "broker_publish",
            BrokerError::Ack { .. } => "broker_ack",
        }
    }
}

/// Failure while querying the tenant catalog.
#[derive(Error, Debug)]
#[error("catalog query failed: {reason}")]
pub struct CatalogError {
    pub reason: String,
}

/// # Umbrella error returned by runtime operations.
///
/// `Shutdown` and `TenantStopped` are cancellation signals: they abort
/// in-flight waits but are swallowed by the worker loop instead of being
/// reported as faults.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The tenant is not present in the registry.
    #[error("tenant '{id}' is not tracked")]
    TenantUnknown { id: Uuid },

    /// The process-wide stop signal fired.
    #[error("shutdown requested")]
    Shutdown,

    /// The per-tenant stop signal fired.
    #[error("tenant stopped")]
    TenantStopped,
}

impl ReaderError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReaderError::Codec(e) => e.as_label(),
            ReaderError::Broker(e) => e.as_label(),
            ReaderError::Catalog(_) => "catalog_query",
            ReaderError::TenantUnknown { .. } => "tenant_unknown",
            ReaderError::Shutdown => "shutdown",
            ReaderError::TenantStopped => "tenant_stopped",
        }
    }

    /// True for the internal cancellation signals.
    ///
    /// Cancellation aborts in-flight work but is never reported as an error
    /// to outside callers.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ReaderError::Shutdown | ReaderError::TenantStopped)
    }
}
