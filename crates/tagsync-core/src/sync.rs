//! Sync coordinator.
//!
//! Owns the connection between the transport and the store: full-state
//! reconciliation on every connect edge, incremental event merges while
//! steady, and the on-demand fetch paths (directory contents, bulk
//! entity-file resolution, debounced thumbnail batches).
//!
//! All state flows one way: user operations go to the backend, the
//! backend confirms through events, events merge into the store. The
//! store is never written optimistically.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures_util::future;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tagsync_api::client::{BackendHandle, EnvPropertyPatch};
use tagsync_api::events::BackendEvent;
use tagsync_api::model::{
    EntityFileResult, EntityId, EnvId, FileHash, Tag, TagId, file_error_status,
};
use tagsync_api::transport::Transport;
use tagsync_api::wire::EventFrame;

use crate::batch::{self, Debouncer};
use crate::model::TagSearchCondition;
use crate::config::{SyncConfig, UnresolvedEntityPolicy};
use crate::error::{Error, Result};
use crate::store::{DataStore, warn_unknown_env};

const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Where the engine currently stands relative to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; the store may be arbitrarily stale.
    Disconnected,
    /// Socket up, full-state reconciliation in flight.
    Reconciling,
    /// Reconciled; incremental events keep the store current.
    Steady,
    /// Socket up but reconciliation failed. No automatic retry — the
    /// next connect edge is the retry trigger.
    Failed,
}

/// The sync engine. Cheap to clone; all clones share one store and one
/// set of background tasks.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    store: Arc<DataStore>,
    backend: BackendHandle,
    state_tx: watch::Sender<ConnectionState>,
    error_tx: broadcast::Sender<Arc<Error>>,
    cancel: CancellationToken,
    thumb_queue: Mutex<ThumbQueue>,
    thumb_debounce: Mutex<Option<Debouncer>>,
}

#[derive(Default)]
struct ThumbQueue {
    env: Option<EnvId>,
    paths: Vec<String>,
}

impl Coordinator {
    pub fn new(transport: Transport, config: SyncConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (error_tx, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                store: Arc::new(DataStore::new()),
                backend: BackendHandle::new(transport),
                state_tx,
                error_tx,
                cancel: CancellationToken::new(),
                thumb_queue: Mutex::new(ThumbQueue::default()),
                thumb_debounce: Mutex::new(None),
            }),
        }
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    /// Typed backend handle, for callers needing raw RPC access.
    pub fn backend(&self) -> &BackendHandle {
        &self.inner.backend
    }

    /// Watch the engine's connection/reconciliation state.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to engine errors that have no direct caller to return
    /// to (reconciliation failures, event-triggered fetch failures).
    pub fn errors(&self) -> broadcast::Receiver<Arc<Error>> {
        self.inner.error_tx.subscribe()
    }

    /// Spawn the background tasks. Must run inside a tokio runtime;
    /// calling it twice is a no-op.
    pub fn start(&self) {
        {
            let mut slot = lock(&self.inner.thumb_debounce);
            if slot.is_some() {
                return;
            }
            let weak = Arc::downgrade(&self.inner);
            *slot = Some(Debouncer::new(
                self.inner.config.thumb_quiet_period,
                self.inner.cancel.child_token(),
                move || {
                    if let Some(inner) = weak.upgrade() {
                        Inner::flush_thumbnails(&inner);
                    }
                },
            ));
        }

        let conn_inner = Arc::clone(&self.inner);
        tokio::spawn(async move { Inner::connection_loop(&conn_inner).await });

        let event_inner = Arc::clone(&self.inner);
        tokio::spawn(async move { Inner::event_loop(&event_inner).await });
    }

    /// Stop the background tasks. The store remains readable.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.state_tx.send_replace(ConnectionState::Disconnected);
    }

    // ── On-demand fetches ────────────────────────────────────────────

    /// Fetch and merge a directory listing.
    ///
    /// When the caller already has the listing cached (`was_cached`),
    /// the fetch is skipped; the event feed keeps cached directories
    /// current.
    pub async fn request_directory_content(
        &self,
        env_id: &EnvId,
        path: &str,
        was_cached: bool,
    ) -> Result<()> {
        if was_cached {
            debug!(%env_id, path, "directory already cached, skipping fetch");
            return Ok(());
        }

        let contents = self.inner.backend.get_directory_contents(env_id, path).await?;
        let child_hashes: Vec<FileHash> = contents.files.iter().map(|f| f.hash.clone()).collect();
        let mut records = contents.files;
        records.push(contents.directory.clone());

        let store = &self.inner.store;
        if !store.overwrite_files(env_id, &records) {
            return Err(Error::UnknownEnvironment(env_id.clone()));
        }
        store.set_directory_children(env_id, &contents.directory, child_hashes);
        Ok(())
    }

    /// Resolve file records for a batch of entity ids and merge them.
    ///
    /// Ids are fetched in chunks of
    /// [`entity_file_chunk_size`](SyncConfig::entity_file_chunk_size),
    /// concurrently. Per-entity error codes are logged; depending on
    /// [`UnresolvedEntityPolicy`] the offending entities may be dropped
    /// from the store.
    pub async fn request_entity_files(
        &self,
        env_id: &EnvId,
        entity_ids: &[EntityId],
    ) -> Result<()> {
        if entity_ids.is_empty() {
            return Ok(());
        }

        let chunks = batch::chunk(entity_ids, self.inner.config.entity_file_chunk_size);
        let fetches = chunks
            .iter()
            .map(|chunk| self.inner.backend.get_entity_files(env_id, chunk));
        let results = future::try_join_all(fetches).await?;

        let mut files = Vec::new();
        let mut unresolved = Vec::new();
        for (entity_id, result) in entity_ids.iter().zip(results.into_iter().flatten()) {
            match result {
                EntityFileResult::File(file) => files.push(*file),
                EntityFileResult::Error(code) => {
                    match code {
                        file_error_status::FILE_DOESNT_EXIST => {
                            warn!(%entity_id, "entity's file no longer exists on disk");
                        }
                        file_error_status::ENTITY_DOESNT_EXIST => {
                            warn!(%entity_id, "entity unknown to the backend");
                        }
                        other => {
                            warn!(%entity_id, code = other, "unrecognized entity-file error code");
                        }
                    }
                    unresolved.push(entity_id.clone());
                }
            }
        }

        let store = &self.inner.store;
        if !files.is_empty() && !store.overwrite_files(env_id, &files) {
            return Err(Error::UnknownEnvironment(env_id.clone()));
        }
        if self.inner.config.unresolved_entity_policy == UnresolvedEntityPolicy::Remove
            && !unresolved.is_empty()
        {
            store.remove_entities(env_id, &unresolved);
        }
        Ok(())
    }

    /// Queue a thumbnail request for `path`.
    ///
    /// Requests are coalesced: the batch flushes once the queue has
    /// been quiet for
    /// [`thumb_quiet_period`](SyncConfig::thumb_quiet_period). A queue
    /// targeting a different environment is flushed immediately before
    /// the new path is queued.
    pub fn request_file_thumbnail(&self, env_id: &EnvId, path: &str) {
        {
            let mut queue = lock(&self.inner.thumb_queue);
            if queue.env.as_ref() != Some(env_id) {
                if !queue.paths.is_empty() {
                    drop(queue);
                    Inner::flush_thumbnails(&self.inner);
                    queue = lock(&self.inner.thumb_queue);
                }
                queue.env = Some(env_id.clone());
            }
            queue.paths.push(path.to_owned());
        }

        if let Some(debouncer) = lock(&self.inner.thumb_debounce).as_ref() {
            debouncer.poke();
        } else {
            warn!("thumbnail requested before start(), flush timer not armed");
        }
    }

    // ── Backend round-trips ──────────────────────────────────────────
    //
    // Mutations go to the backend only; the confirming event merges the
    // change into the store (every connected client converges through
    // the same feed).

    pub async fn update_tag(&self, env_id: &EnvId, tag: &Tag) -> Result<()> {
        self.inner.backend.update_tag(env_id, tag).await?;
        Ok(())
    }

    /// Delete a tag. The backend emits no dedicated removal event, so
    /// on success the local merge runs directly.
    pub async fn remove_tag(&self, env_id: &EnvId, tag_id: &TagId) -> Result<()> {
        self.inner.backend.remove_tag(env_id, tag_id).await?;
        if !self.inner.store.remove_tag(env_id, tag_id) {
            return Err(Error::UnknownEnvironment(env_id.clone()));
        }
        Ok(())
    }

    pub async fn set_env_property(&self, env_id: &EnvId, patch: &EnvPropertyPatch) -> Result<()> {
        self.inner.backend.set_env_property(env_id, patch).await?;
        Ok(())
    }

    pub async fn close_environment(&self, env_id: &EnvId) -> Result<()> {
        self.inner.backend.close_environment(env_id).await?;
        Ok(())
    }

    // ── Local-only state ─────────────────────────────────────────────

    pub fn set_sub_route(&self, env_id: &EnvId, sub_route: String) -> Result<()> {
        self.env_local(env_id, self.inner.store.set_sub_route(env_id, sub_route))
    }

    pub fn set_tag_selection(&self, env_id: &EnvId, tag_id: TagId, selected: bool) -> Result<()> {
        self.env_local(
            env_id,
            self.inner.store.set_tag_selection(env_id, tag_id, selected),
        )
    }

    pub fn set_tag_search_condition(
        &self,
        env_id: &EnvId,
        condition: TagSearchCondition,
    ) -> Result<()> {
        self.env_local(
            env_id,
            self.inner.store.set_tag_search_condition(env_id, condition),
        )
    }

    pub fn set_tag_filter(&self, env_id: &EnvId, filter: String) -> Result<()> {
        self.env_local(env_id, self.inner.store.set_tag_filter(env_id, filter))
    }

    fn env_local(&self, env_id: &EnvId, applied: bool) -> Result<()> {
        if applied {
            Ok(())
        } else {
            Err(Error::UnknownEnvironment(env_id.clone()))
        }
    }
}

impl Inner {
    // ── Connection handling ──────────────────────────────────────────

    async fn connection_loop(inner: &Arc<Inner>) {
        let mut conn = inner.backend.transport().connection();
        loop {
            let connected = *conn.borrow_and_update();
            if connected {
                inner.state_tx.send_replace(ConnectionState::Reconciling);
                match Self::reconcile(inner).await {
                    Ok(()) => {
                        info!("reconciliation complete");
                        inner.state_tx.send_replace(ConnectionState::Steady);
                    }
                    Err(e) => {
                        inner.state_tx.send_replace(ConnectionState::Failed);
                        Self::report(inner, e);
                    }
                }
            } else {
                inner.state_tx.send_replace(ConnectionState::Disconnected);
            }

            tokio::select! {
                () = inner.cancel.cancelled() => return,
                changed = conn.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Rebuild the store from authoritative backend state.
    ///
    /// Client identity and the connection list fetch concurrently, then
    /// the environment list, then every environment's tags and entities
    /// concurrently. Any failure aborts the pass; the next connect edge
    /// retries.
    async fn reconcile(inner: &Arc<Inner>) -> Result<()> {
        let backend = &inner.backend;

        let (client, connections) =
            future::try_join(backend.get_client_details(), backend.get_connection_list())
                .await
                .map_err(Error::reconciliation)?;
        inner.store.set_client_details(client);
        inner.store.set_connection_list(connections);

        let summaries = backend.get_summaries().await.map_err(Error::reconciliation)?;
        inner.store.set_summaries(summaries.clone());

        let detail_fetches = summaries
            .iter()
            .map(|summary| Self::fetch_env_details(inner, &summary.id));
        future::try_join_all(detail_fetches).await?;

        inner.store.mark_reconciled(Utc::now());
        Ok(())
    }

    async fn fetch_env_details(inner: &Arc<Inner>, env_id: &EnvId) -> Result<()> {
        let backend = &inner.backend;
        let (tags, entities) =
            future::try_join(backend.get_all_tags(env_id), backend.get_all_entities(env_id))
                .await
                .map_err(Error::reconciliation)?;
        inner.store.set_all_tags(env_id, tags);
        inner.store.set_all_entities(env_id, entities);
        Ok(())
    }

    // ── Event handling ───────────────────────────────────────────────

    async fn event_loop(inner: &Arc<Inner>) {
        let mut events = inner.backend.transport().subscribe();
        loop {
            tokio::select! {
                () = inner.cancel.cancelled() => return,
                received = events.recv() => match received {
                    Ok(frame) => Self::handle_event_frame(inner, &frame),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Skipped merges can only be repaired by a full
                        // pass; flag it rather than guessing.
                        warn!(skipped, "event feed lagged, store may be stale until next reconnect");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }

    fn handle_event_frame(inner: &Arc<Inner>, frame: &EventFrame) {
        match BackendEvent::parse(frame) {
            Ok(Some(event)) => Self::apply_event(inner, event),
            Ok(None) => warn!(event = %frame.event, "unknown event name, dropped"),
            Err(e) => warn!(event = %frame.event, error = %e, "malformed event payload, dropped"),
        }
    }

    /// Merge one event into the store.
    ///
    /// Environment-scoped events for environments the store does not
    /// track are dropped with a warning; the next reconciliation pass
    /// restores consistency.
    fn apply_event(inner: &Arc<Inner>, event: BackendEvent) {
        let store = &inner.store;
        match event {
            BackendEvent::AddConnection(connection) => store.add_connection(connection),
            BackendEvent::RemoveConnection(id) => store.remove_connection(&id),
            BackendEvent::CreateEnvironment(summary) => {
                let env_id = summary.id.clone();
                store.update_summary(summary);
                // A pushed environment arrives bare; pull its details.
                let detail_inner = Arc::clone(inner);
                tokio::spawn(async move {
                    if let Err(e) = Self::fetch_env_details(&detail_inner, &env_id).await {
                        Self::report(&detail_inner, e);
                    }
                });
            }
            BackendEvent::CloseEnvironment(id) => store.close_environment(&id),
            BackendEvent::UpdateEnvSummary(summary) => store.update_summary(summary),
            BackendEvent::EnvAddEntities { id, entities }
            | BackendEvent::EnvUpdateEntities { id, entities } => {
                warn_unknown_env(store.update_entities(&id, entities), &id, "entity update");
            }
            BackendEvent::EnvRemoveEntities { id, entity_ids } => {
                warn_unknown_env(
                    store.remove_entities(&id, &entity_ids),
                    &id,
                    "entity removal",
                );
            }
            BackendEvent::EnvAddFiles { id, files } => {
                warn_unknown_env(store.overwrite_files(&id, &files), &id, "file add");
            }
            BackendEvent::EnvRemoveFiles { id, hashes } => {
                warn_unknown_env(store.remove_files(&id, &hashes), &id, "file removal");
            }
            BackendEvent::EnvUpdateThumbs {
                id,
                thumbs,
                thumb_state,
            } => {
                warn_unknown_env(
                    store.update_thumbnail_states(&id, &thumbs, thumb_state),
                    &id,
                    "thumbnail update",
                );
            }
            BackendEvent::EnvAddTags { id, tags } => {
                warn_unknown_env(store.add_or_update_tags(&id, tags), &id, "tag update");
            }
            BackendEvent::EnvTagFiles {
                id,
                entities,
                tag_ids,
            } => {
                warn_unknown_env(store.tag_files(&id, entities, &tag_ids), &id, "tagging");
            }
            BackendEvent::EnvUntagFiles {
                id,
                entity_ids,
                tag_ids,
            } => {
                warn_unknown_env(
                    store.untag_files(&id, &entity_ids, &tag_ids),
                    &id,
                    "untagging",
                );
            }
        }
    }

    // ── Thumbnails ───────────────────────────────────────────────────

    /// Swap the queue out under the lock and send its contents in the
    /// background. Thumbnails are best-effort; failures are logged and
    /// dropped.
    fn flush_thumbnails(inner: &Arc<Inner>) {
        let (env_id, paths) = {
            let mut queue = lock(&inner.thumb_queue);
            let Some(env_id) = queue.env.clone() else {
                return;
            };
            (env_id, std::mem::take(&mut queue.paths))
        };
        if paths.is_empty() {
            return;
        }

        debug!(%env_id, count = paths.len(), "flushing thumbnail batch");
        let send_inner = Arc::clone(inner);
        tokio::spawn(async move {
            if let Err(e) = send_inner
                .backend
                .request_file_thumbnails(&env_id, &paths)
                .await
            {
                debug!(%env_id, error = %e, "thumbnail batch request failed");
            }
        });
    }

    fn report(inner: &Arc<Inner>, err: Error) {
        error!(error = %err, "sync engine error");
        let _ = inner.error_tx.send(Arc::new(err));
    }
}

/// Mutex lock that recovers from poisoning; the guarded data stays
/// structurally valid.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
