//! Normalized state snapshots.
//!
//! The whole mirror is a tree of plain values: a global slice (client
//! identity, connections, environment list) over per-environment slices
//! (summary, tags, entities, files, UI-local search state). Snapshots
//! are immutable once published — merge operations build new values and
//! consumers diff by `Arc` identity or store version, never by deep
//! comparison.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::model::{
    ClientConnection, ClientDetails, ConnectionId, Entity, EntityId, EnvId, EnvSummary, File,
    FileHash, SearchState, Tag, TagId, DEFAULT_SUB_ROUTE,
};

/// Per-environment normalized slice.
///
/// Map keys are unique within the environment; merges are always scoped
/// to one `EnvState`, so cross-environment leakage is impossible by
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvState {
    pub summary: EnvSummary,

    /// UI-local sub-route; never touched by backend events.
    pub sub_route: String,

    /// Tag id ordering: append-set-union on creation, never implicitly
    /// reordered.
    pub tag_ids: Vec<TagId>,
    pub tag_map: HashMap<TagId, Tag>,

    pub entity_map: HashMap<EntityId, Entity>,
    pub file_map: HashMap<FileHash, File>,

    pub search: SearchState,
}

impl EnvState {
    /// Fresh sub-state for a newly listed environment.
    pub fn new(summary: EnvSummary) -> Self {
        Self {
            summary,
            sub_route: DEFAULT_SUB_ROUTE.to_owned(),
            tag_ids: Vec::new(),
            tag_map: HashMap::new(),
            entity_map: HashMap::new(),
            file_map: HashMap::new(),
            search: SearchState::default(),
        }
    }
}

/// The root snapshot: global slice plus one [`EnvState`] per open
/// environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub client: ClientDetails,
    pub connection_map: HashMap<ConnectionId, ClientConnection>,

    /// Environment ids in backend listing order.
    pub env_ids: Vec<EnvId>,
    pub env_map: HashMap<EnvId, Arc<EnvState>>,

    /// When the last full reconciliation completed.
    pub last_reconciled: Option<DateTime<Utc>>,
}

impl AppState {
    pub fn env(&self, id: &EnvId) -> Option<&Arc<EnvState>> {
        self.env_map.get(id)
    }
}
