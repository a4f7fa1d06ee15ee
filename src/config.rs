//! # Global runtime configuration.
//!
//! [`Config`] defines the reader's behavior: channel capacities, the recovery
//! inactivity window, and every broker subject the crate derives.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use metavisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.recovery_window = Duration::from_secs(60);
//! cfg.live_channel_capacity = 512;
//!
//! assert_eq!(cfg.live_channel_capacity, 512);
//! ```

use std::time::Duration;

/// Global configuration for the supervisor and its tenant workers.
///
/// Controls channel sizing, the recovery inactivity window, and subject naming.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of each tenant's bounded live-message channel.
    ///
    /// In practice this should match the durable broker's in-flight window:
    /// the worker acknowledges only after a successful downstream publish, so
    /// the unacked-message limit is the real back-pressure mechanism.
    pub live_channel_capacity: usize,
    /// Queue depth of the per-call recovery response inbox.
    pub response_queue_capacity: usize,
    /// How long a recovery exchange waits without hearing a response batch
    /// before giving up and letting the live stream retry the gap.
    pub recovery_window: Duration,
    /// Subject prefix for per-tenant live update streams (durable broker).
    pub live_topic_prefix: String,
    /// Subject prefix for missing-range requests (plain broker).
    pub request_topic_prefix: String,
    /// Subject prefix for missing-range responses (plain broker).
    pub response_topic_prefix: String,
    /// Subject prefix for downstream indexer publishes; the tenant's routing
    /// key is appended as the final token.
    pub indexer_topic: String,
    /// Well-known subject carrying tenant-connected announcements.
    pub announce_subject: String,
}

impl Default for Config {
    /// Provides the production defaults:
    /// - `live_channel_capacity = 256`
    /// - `response_queue_capacity = 1024`
    /// - `recovery_window = 20 minutes`
    /// - subjects under the `updates.*` namespace, announcements on `tenant.connected`
    fn default() -> Self {
        Self {
            live_channel_capacity: 256,
            response_queue_capacity: 1024,
            recovery_window: Duration::from_secs(20 * 60),
            live_topic_prefix: "updates.live".to_string(),
            request_topic_prefix: "updates.request".to_string(),
            response_topic_prefix: "updates.response".to_string(),
            indexer_topic: "updates.index".to_string(),
            announce_subject: "tenant.connected".to_string(),
        }
    }
}
