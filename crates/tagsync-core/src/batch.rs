//! Request batching primitives: fixed-size chunking for bulk fetches
//! and a trailing-edge debouncer for coalescing bursts.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Split `items` into consecutive chunks of at most `size` elements.
///
/// Order is preserved and the last chunk may be short. A zero `size` is
/// treated as "no limit" and yields a single chunk.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    if size == 0 {
        return vec![items.to_vec()];
    }
    items.chunks(size).map(<[T]>::to_vec).collect()
}

/// Trailing-edge debouncer.
///
/// Each [`poke`](Debouncer::poke) arms (or re-arms) a quiet-period
/// timer; when a full quiet period passes with no further pokes, the
/// flush callback runs once. Pokes arriving after a flush start a new
/// cycle. The worker task exits when the token is cancelled or every
/// handle is dropped.
#[derive(Debug, Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    pub fn new<F>(quiet_period: Duration, cancel: CancellationToken, mut on_flush: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        tokio::spawn(async move {
            loop {
                // Idle until the first poke of a cycle.
                tokio::select! {
                    () = cancel.cancelled() => return,
                    first = rx.recv() => {
                        if first.is_none() {
                            return;
                        }
                    }
                }
                // Armed: restart the quiet period on every further poke.
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => return,
                        poke = rx.recv() => {
                            if poke.is_none() {
                                return;
                            }
                            trace!("debounce timer re-armed");
                        }
                        () = tokio::time::sleep(quiet_period) => {
                            on_flush();
                            break;
                        }
                    }
                }
            }
        });
        Self { tx }
    }

    /// Signal activity. Never blocks; returns silently once the worker
    /// has shut down.
    pub fn poke(&self) {
        let _ = self.tx.send(());
    }
}
