//! # metavisor
//!
//! **Metavisor** is a per-tenant metadata update reader for a central control
//! plane: it subscribes to ordered resource-update streams published by many
//! remote tenants, detects gaps in each tenant's version sequence, recovers
//! missing ranges through a request/response side channel, and republishes
//! the reconstructed, gap-free stream to a downstream indexer.
//!
//! ## Features
//!
//! | Area            | Description                                                          | Key types / traits                        |
//! |-----------------|----------------------------------------------------------------------|-------------------------------------------|
//! | **Supervision** | Track a dynamic tenant set, one worker per tenant, clean shutdown.   | [`Supervisor`]                            |
//! | **Recovery**    | Missing-range request/response with a bounded inactivity window.     | [`MissingRangeRequest`], [`MissingRangeResponse`] |
//! | **Seams**       | Trait interfaces for the brokers and the tenant catalog.             | [`broker::DurableBroker`], [`broker::PlainBroker`], [`broker::Catalog`] |
//! | **Codec**       | Tenant-envelope encode/decode for every wire shape.                  | [`codec`], [`ResourceUpdate`]             |
//! | **Errors**      | Typed errors with stable metric labels.                              | [`ReaderError`], [`CodecError`]           |
//! | **Configuration** | Channel sizing, recovery window, subject naming.                   | [`Config`]                                |
//!
//! ```no_run
//! use std::sync::Arc;
//! use metavisor::{Config, Supervisor};
//! use metavisor::broker::{Catalog, DurableBroker, PlainBroker};
//!
//! async fn bootstrap(
//!     catalog: Arc<dyn Catalog>,
//!     durable: Arc<dyn DurableBroker>,
//!     plain: Arc<dyn PlainBroker>,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let supervisor = Supervisor::new(Config::default(), catalog, durable, plain).await?;
//!
//!     // ... run until the process is told to exit ...
//!
//!     supervisor.stop();
//!     Ok(())
//! }
//! ```
//!
//! ---

pub mod broker;
pub mod codec;
mod config;
mod core;
mod error;
mod topics;

// ---- Public re-exports ----

pub use crate::codec::{
    MissingRangeRequest, MissingRangeResponse, PayloadKind, ResourceUpdate, TenantConnected,
};
pub use crate::config::Config;
pub use crate::core::supervisor::Supervisor;
pub use crate::error::{BrokerError, CatalogError, CodecError, ReaderError};
