//! Local mirror of a remote file-tagging backend.
//!
//! The backend owns all persistent state (environments, files, tagging
//! entities, tags); this crate maintains a normalized in-memory replica
//! of it for a collection-browsing client. Three layers:
//!
//! - [`store`]: immutable [`AppState`](store::AppState) snapshots with
//!   pure, idempotent merge operations and watch-based change
//!   notification.
//! - [`sync`]: the [`Coordinator`](sync::Coordinator), which
//!   reconciles on every connect edge and merges incremental events
//!   while steady.
//! - [`batch`]: chunking and debouncing for the bulk fetch paths.
//!
//! ```no_run
//! use tagsync_api::socket::ReconnectConfig;
//! use tagsync_api::transport::Transport;
//! use tagsync_core::config::SyncConfig;
//! use tagsync_core::sync::Coordinator;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::default();
//! let transport = Transport::connect(
//!     "ws://localhost:10548".parse()?,
//!     config.call_timeout,
//!     ReconnectConfig::default(),
//!     CancellationToken::new(),
//! );
//! let coordinator = Coordinator::new(transport, config);
//! coordinator.start();
//!
//! let mut snapshots = coordinator.store().subscribe();
//! while snapshots.changed().await.is_ok() {
//!     let state = snapshots.borrow_and_update().clone();
//!     println!("{} environments", state.env_ids.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod sync;

pub use config::{SyncConfig, UnresolvedEntityPolicy};
pub use error::{Error, Result};
pub use store::{AppState, DataStore, EnvState};
pub use sync::{ConnectionState, Coordinator};
