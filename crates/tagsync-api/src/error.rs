use thiserror::Error;

/// Top-level error type for the `tagsync-api` crate.
///
/// Covers every failure mode at the transport boundary: backend-signaled
/// rejections, local timeouts, socket lifecycle, and (de)serialization.
/// `tagsync-core` maps these into its own coordination taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Backend-signaled ────────────────────────────────────────────
    /// The backend explicitly rejected a call and supplied a message.
    #[error("Backend rejected call: {message}")]
    Remote { message: String },

    // ── Local call lifecycle ────────────────────────────────────────
    /// No response arrived within the configured deadline. The pending
    /// callback is abandoned; the backend operation is NOT cancelled.
    #[error("Call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The socket dropped while the call was in flight. Pending calls
    /// are abandoned on reconnect, never resumed.
    #[error("Connection reset while call was pending")]
    ConnectionReset,

    /// The transport has been shut down; no further calls are possible.
    #[error("Transport channel closed")]
    ChannelClosed,

    // ── Socket ──────────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// A frame or payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a transient transport failure that a
    /// fresh connection may resolve.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConnectionReset | Self::WebSocketConnect(_)
        )
    }
}
