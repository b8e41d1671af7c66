//! Wire protocol and transport layer for the tagsync client.
//!
//! This crate owns everything that touches the backend socket:
//!
//! - **[`Transport`]** — request/response RPC over a bidirectional frame
//!   channel: correlation ids, per-call deadlines, a pending-callback
//!   map, and a multiplexed broadcast event feed. Constructed over an
//!   in-memory channel (tests, embedding) or a live websocket with
//!   auto-reconnect ([`Transport::connect`]).
//!
//! - **[`BackendHandle`]** — typed async wrapper, one method per remote
//!   method (`getSummaries`, `getAllTags`, `getEntityFiles`, ...).
//!
//! - **[`BackendEvent`]** — closed enum of every event the backend
//!   pushes; `tagsync-core` matches it exhaustively.
//!
//! - **[`model`]** — canonical domain types (`EnvSummary`, `Tag`,
//!   `Entity`, `FileRecord`, ...) shared with the store.

pub mod client;
pub mod error;
pub mod events;
pub mod model;
pub mod socket;
pub mod transport;
pub mod wire;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{BackendHandle, EnvPropertyPatch};
pub use error::Error;
pub use events::BackendEvent;
pub use socket::ReconnectConfig;
pub use transport::{DEFAULT_CALL_TIMEOUT, Transport};
pub use wire::{EventFrame, Frame, RequestFrame, ResponseFrame};
