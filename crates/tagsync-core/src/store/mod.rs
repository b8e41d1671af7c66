//! Reactive snapshot store.
//!
//! [`DataStore`] holds the current [`AppState`] behind an [`ArcSwap`]
//! and republishes every new snapshot on a watch channel together with
//! a monotonically increasing version. Reads are lock-free; writes
//! serialize on an internal mutex so each merge sees the snapshot its
//! predecessor published.
//!
//! All merge semantics live in [`reducers`] as pure functions; the
//! store only wires them to snapshots and change notification.

pub mod reducers;
pub mod state;

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::warn;

pub use state::{AppState, EnvState};

use crate::model::{
    ClientConnection, ClientDetails, ConnectionId, Entity, EntityId, EntityPatch, EnvId,
    EnvSummary, FileHash, FileRecord, Tag, TagId, TagSearchCondition, ThumbUpdate, ThumbnailState,
};

pub struct DataStore {
    current: ArcSwap<AppState>,
    snapshot_tx: watch::Sender<Arc<AppState>>,
    version_tx: watch::Sender<u64>,
    /// Serializes read-modify-publish cycles; readers never take it.
    write_lock: Mutex<()>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        let initial = Arc::new(AppState::default());
        let (snapshot_tx, _) = watch::channel(Arc::clone(&initial));
        let (version_tx, _) = watch::channel(0);
        Self {
            current: ArcSwap::new(initial),
            snapshot_tx,
            version_tx,
            write_lock: Mutex::new(()),
        }
    }

    /// The latest published snapshot.
    pub fn current(&self) -> Arc<AppState> {
        self.current.load_full()
    }

    /// Watch receiver that yields each newly published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.snapshot_tx.subscribe()
    }

    /// Monotonic change counter; bumps by one per published snapshot.
    pub fn version(&self) -> u64 {
        *self.version_tx.borrow()
    }

    pub fn watch_version(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    fn mutate(&self, f: impl FnOnce(&AppState) -> AppState) {
        let guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.current.load();
        let next = Arc::new(f(&current));
        self.current.store(Arc::clone(&next));
        self.snapshot_tx.send_replace(next);
        self.version_tx.send_modify(|v| *v += 1);
        drop(guard);
    }

    /// Apply an environment-scoped merge. Returns `false` without
    /// publishing when the environment is unknown — the caller decides
    /// whether that is worth a warning.
    fn mutate_env(&self, id: &EnvId, f: impl FnOnce(&EnvState) -> EnvState) -> bool {
        let guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.current.load();
        let Some(env) = current.env_map.get(id) else {
            return false;
        };
        let mut next = (**current).clone();
        next.env_map.insert(id.clone(), Arc::new(f(env)));
        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        self.snapshot_tx.send_replace(next);
        self.version_tx.send_modify(|v| *v += 1);
        drop(guard);
        true
    }

    // ── Global slice ─────────────────────────────────────────────────

    pub fn set_client_details(&self, client: ClientDetails) {
        self.mutate(|s| reducers::set_client_details(s, client));
    }

    pub fn set_connection_list(&self, connections: Vec<ClientConnection>) {
        self.mutate(|s| reducers::set_connection_list(s, connections));
    }

    pub fn add_connection(&self, connection: ClientConnection) {
        self.mutate(|s| reducers::add_connection(s, connection));
    }

    pub fn remove_connection(&self, id: &ConnectionId) {
        self.mutate(|s| reducers::remove_connection(s, id));
    }

    pub fn set_summaries(&self, summaries: Vec<EnvSummary>) {
        self.mutate(|s| reducers::set_summaries(s, summaries));
    }

    pub fn update_summary(&self, summary: EnvSummary) {
        self.mutate(|s| reducers::update_summary(s, summary));
    }

    pub fn close_environment(&self, id: &EnvId) {
        self.mutate(|s| reducers::close_environment(s, id));
    }

    pub fn mark_reconciled(&self, at: DateTime<Utc>) {
        self.mutate(|s| reducers::mark_reconciled(s, at));
    }

    // ── Environment slice ────────────────────────────────────────────

    pub fn set_sub_route(&self, id: &EnvId, sub_route: String) -> bool {
        self.mutate_env(id, |e| reducers::set_sub_route(e, sub_route))
    }

    pub fn set_tag_selection(&self, id: &EnvId, tag_id: TagId, selected: bool) -> bool {
        self.mutate_env(id, |e| reducers::set_tag_selection(e, tag_id, selected))
    }

    pub fn set_tag_search_condition(&self, id: &EnvId, condition: TagSearchCondition) -> bool {
        self.mutate_env(id, |e| reducers::set_tag_search_condition(e, condition))
    }

    pub fn set_tag_filter(&self, id: &EnvId, filter: String) -> bool {
        self.mutate_env(id, |e| reducers::set_tag_filter(e, filter))
    }

    pub fn set_all_tags(&self, id: &EnvId, tags: Vec<Tag>) -> bool {
        self.mutate_env(id, |e| reducers::set_all_tags(e, tags))
    }

    pub fn add_or_update_tags(&self, id: &EnvId, tags: Vec<Tag>) -> bool {
        self.mutate_env(id, |e| reducers::add_or_update_tags(e, tags))
    }

    pub fn remove_tag(&self, id: &EnvId, tag_id: &TagId) -> bool {
        self.mutate_env(id, |e| reducers::remove_tag(e, tag_id))
    }

    pub fn set_all_entities(&self, id: &EnvId, entities: Vec<Entity>) -> bool {
        self.mutate_env(id, |e| reducers::set_all_entities(e, entities))
    }

    pub fn update_entities(&self, id: &EnvId, patches: Vec<EntityPatch>) -> bool {
        self.mutate_env(id, |e| reducers::update_entities(e, patches))
    }

    pub fn remove_entities(&self, id: &EnvId, entity_ids: &[EntityId]) -> bool {
        self.mutate_env(id, |e| reducers::remove_entities(e, entity_ids))
    }

    pub fn tag_files(&self, id: &EnvId, entities: Vec<EntityPatch>, tag_ids: &[TagId]) -> bool {
        self.mutate_env(id, |e| reducers::tag_files(e, entities, tag_ids))
    }

    pub fn untag_files(&self, id: &EnvId, entity_ids: &[EntityId], tag_ids: &[TagId]) -> bool {
        self.mutate_env(id, |e| reducers::untag_files(e, entity_ids, tag_ids))
    }

    pub fn overwrite_files(&self, id: &EnvId, files: &[FileRecord]) -> bool {
        self.mutate_env(id, |e| reducers::overwrite_files(e, files))
    }

    pub fn remove_files(&self, id: &EnvId, hashes: &[FileHash]) -> bool {
        self.mutate_env(id, |e| reducers::remove_files(e, hashes))
    }

    pub fn set_directory_children(
        &self,
        id: &EnvId,
        directory: &FileRecord,
        child_hashes: Vec<FileHash>,
    ) -> bool {
        self.mutate_env(id, |e| {
            reducers::set_directory_children(e, directory, child_hashes)
        })
    }

    pub fn update_thumbnail_states(
        &self,
        id: &EnvId,
        thumbs: &[ThumbUpdate],
        state: ThumbnailState,
    ) -> bool {
        self.mutate_env(id, |e| reducers::update_thumbnail_states(e, thumbs, state))
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// Convenience for callers reacting to environment-scoped merges that
/// may race environment closure.
pub fn warn_unknown_env(applied: bool, id: &EnvId, what: &str) {
    if !applied {
        warn!(env_id = %id, "{what} for unknown environment, dropped");
    }
}
