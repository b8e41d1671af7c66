//! Sync engine tuning knobs.

use std::time::Duration;

use tagsync_api::socket::ReconnectConfig;
use tagsync_api::transport::DEFAULT_CALL_TIMEOUT;

/// What to do with entity ids the backend cannot resolve to a file
/// during a bulk entity-file fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnresolvedEntityPolicy {
    /// Keep the stale entity in the store; only log the error code.
    #[default]
    Keep,
    /// Drop the entity locally so search results stop referencing it.
    Remove,
}

/// Tuning knobs for the sync engine. [`SyncConfig::default`] matches
/// the backend's expectations and rarely needs changing.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Per-request timeout for backend calls.
    pub call_timeout: Duration,
    /// Quiet period before a batched thumbnail request is flushed.
    pub thumb_quiet_period: Duration,
    /// Maximum entity ids per `getEntityFiles` request.
    pub entity_file_chunk_size: usize,
    /// Socket reconnect backoff.
    pub reconnect: ReconnectConfig,
    pub unresolved_entity_policy: UnresolvedEntityPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            thumb_quiet_period: Duration::from_millis(100),
            entity_file_chunk_size: 75,
            reconnect: ReconnectConfig::default(),
            unresolved_entity_policy: UnresolvedEntityPolicy::default(),
        }
    }
}
