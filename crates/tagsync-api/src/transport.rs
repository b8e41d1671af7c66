//! Request/response transport wrapper over a bidirectional frame channel.
//!
//! Turns the raw socket into an RPC surface: every call gets a
//! monotonically increasing correlation id and a pending-callback entry;
//! responses are matched by id and the entry removed on settlement, so a
//! callback fires at most once. Unsolicited event frames fan out through
//! a single multiplexed broadcast channel.
//!
//! The wrapper holds no cross-reconnect state beyond the pending map,
//! and pending calls are abandoned (failed with
//! [`Error::ConnectionReset`]) when the socket drops — never resumed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::socket::{self, ReconnectConfig};
use crate::wire::{EventFrame, Frame, RequestFrame};

/// Default deadline for a single call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5000);

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

type PendingSender = oneshot::Sender<Result<Value, Error>>;

/// Handle to the backend socket. Cheaply cloneable.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    next_request_id: AtomicU64,
    pending: DashMap<u64, PendingSender>,
    outbound: mpsc::Sender<String>,
    event_tx: broadcast::Sender<Arc<EventFrame>>,
    connected: watch::Sender<bool>,
    call_timeout: Duration,
}

impl Transport {
    /// Build a transport over an in-memory frame channel.
    ///
    /// Returns the handle plus the receiver for outbound frames. The
    /// caller (socket pump or test harness) reads outbound frames from
    /// the receiver and feeds inbound frames through
    /// [`handle_frame`](Self::handle_frame).
    pub fn channel(call_timeout: Duration) -> (Self, mpsc::Receiver<String>) {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (connected, _) = watch::channel(false);

        let transport = Self {
            inner: Arc::new(TransportInner {
                next_request_id: AtomicU64::new(0),
                pending: DashMap::new(),
                outbound,
                event_tx,
                connected,
                call_timeout,
            }),
        };
        (transport, outbound_rx)
    }

    /// Connect to a backend websocket and spawn the reconnection loop.
    ///
    /// Returns immediately; watch [`connection`](Self::connection) for
    /// the first connect edge.
    pub fn connect(
        url: Url,
        call_timeout: Duration,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (transport, outbound_rx) = Self::channel(call_timeout);
        let pump = transport.clone();
        tokio::spawn(async move {
            socket::ws_loop(url, pump, outbound_rx, reconnect, cancel).await;
        });
        transport
    }

    /// Issue an RPC call and await its response.
    ///
    /// Fails with [`Error::Remote`] when the backend rejects the call,
    /// and with [`Error::Timeout`] when no response arrives within the
    /// deadline. A timeout abandons the local callback only — the
    /// backend operation still runs to completion on its side.
    pub async fn call(&self, method: &str, payload: Value) -> Result<Value, Error> {
        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let text = Frame::Request(RequestFrame {
            request_id,
            method: method.to_owned(),
            payload,
        })
        .encode()?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(request_id, tx);

        if self.inner.outbound.send(text).await.is_err() {
            self.inner.pending.remove(&request_id);
            return Err(Error::ChannelClosed);
        }

        match tokio::time::timeout(self.inner.call_timeout, rx).await {
            Ok(Ok(settled)) => settled,
            // Pending entry dropped without settling (transport torn down).
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                self.inner.pending.remove(&request_id);
                let timeout_ms = u64::try_from(self.inner.call_timeout.as_millis())
                    .unwrap_or(u64::MAX);
                warn!(method, request_id, timeout_ms, "call timed out, abandoning callback");
                Err(Error::Timeout { timeout_ms })
            }
        }
    }

    /// Subscribe to the multiplexed event feed.
    ///
    /// Consumers that fall behind receive
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EventFrame>> {
        self.inner.event_tx.subscribe()
    }

    /// Watch the socket connection state. Each `false -> true` edge is
    /// the signal to re-run full reconciliation.
    pub fn connection(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    /// Route one inbound text frame.
    ///
    /// Called by the socket pump for every received frame; exposed so
    /// tests and in-memory backends can drive the transport directly.
    pub fn handle_frame(&self, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "failed to decode inbound frame, skipping");
                return;
            }
        };

        match frame {
            Frame::Response(resp) => {
                // Removing the entry before settling guarantees the
                // callback fires at most once.
                let Some((_, tx)) = self.inner.pending.remove(&resp.request_id) else {
                    debug!(
                        request_id = resp.request_id,
                        "response for unknown or abandoned call"
                    );
                    return;
                };
                let settled = match resp.error {
                    Some(message) => Err(Error::Remote { message }),
                    None => Ok(resp.result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(settled);
            }
            Frame::Event(event) => {
                // Send errors just mean no active subscribers right now.
                let _ = self.inner.event_tx.send(Arc::new(event));
            }
            Frame::Request(req) => {
                debug!(method = %req.method, "ignoring inbound request frame on client socket");
            }
        }
    }

    /// Flip the connection state. On disconnect, abandon every pending
    /// call with [`Error::ConnectionReset`].
    pub fn set_connected(&self, connected: bool) {
        let was = self.inner.connected.send_replace(connected);
        if was && !connected {
            self.abandon_pending();
        }
    }

    fn abandon_pending(&self) {
        let ids: Vec<u64> = self.inner.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.inner.pending.remove(&id) {
                let _ = tx.send(Err(Error::ConnectionReset));
            }
        }
    }

    /// Number of in-flight calls (diagnostics).
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }
}
