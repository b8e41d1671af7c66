//! Store-side model types.
//!
//! Most of the domain lives in [`tagsync_api::model`] (the backend is
//! the source of truth for those shapes); this module adds the types
//! that exist only inside the local mirror: the store's file projection
//! and the UI-local search sub-state.

use serde::{Deserialize, Serialize};

pub use tagsync_api::model::{
    ClientConnection, ClientDetails, ConnectionId, DirectoryContents, Entity, EntityFileResult,
    EntityId, EntityPatch, EnvId, EnvSummary, FileHash, FileRecord, Tag, TagId, ThumbUpdate,
    ThumbnailState, file_error_status, parent_dir_hash,
};

/// Default sub-route for a freshly opened environment.
pub const DEFAULT_SUB_ROUTE: &str = "/browse";

// ── File projection ──────────────────────────────────────────────────

/// A file as the store holds it.
///
/// Identical to the wire [`FileRecord`] except that `tag_ids` is
/// stripped — tag membership lives only on the Entity. `entity_id` is a
/// weak back-reference kept consistent with the entity map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub hash: FileHash,
    pub nix_path: String,
    pub base: String,
    pub ext: String,
    pub name: String,
    pub is_dir: bool,
    pub entity_id: Option<EntityId>,
    pub thumb_name: Option<String>,
    pub thumb_state: Option<ThumbnailState>,
    pub read_time: i64,
    /// For directories: hashes of direct children. `None` until the
    /// directory's contents have been fetched at least once.
    pub file_hashes: Option<Vec<FileHash>>,
}

impl File {
    /// Fingerprint of this file's parent directory path.
    pub fn parent_dir_hash(&self) -> FileHash {
        parent_dir_hash(&self.nix_path, &self.base)
    }

    /// Merge a wire record over an existing store file.
    ///
    /// The record's `tag_ids` is dropped; thumbnail fields and
    /// child-hash tracking are preserved when the record omits them.
    pub fn merged(old: Option<&File>, record: &FileRecord) -> File {
        File {
            hash: record.hash.clone(),
            nix_path: record.nix_path.clone(),
            base: record.base.clone(),
            ext: record.ext.clone(),
            name: record.name.clone(),
            is_dir: record.is_dir,
            entity_id: record.entity_id.clone(),
            thumb_name: record
                .thumb_name
                .clone()
                .or_else(|| old.and_then(|f| f.thumb_name.clone())),
            thumb_state: record.thumb_state.or_else(|| old.and_then(|f| f.thumb_state)),
            read_time: record.read_time,
            file_hashes: record
                .file_hashes
                .clone()
                .or_else(|| old.and_then(|f| f.file_hashes.clone())),
        }
    }
}

// ── Search sub-state ─────────────────────────────────────────────────

/// Condition combining multiple selected tags during search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagSearchCondition {
    /// Files must carry every selected tag.
    #[default]
    All,
    /// Files must carry at least one selected tag.
    Any,
}

/// UI-local tag search state for one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchState {
    /// Tags currently selected in the search panel.
    pub selected_tags: std::collections::BTreeSet<TagId>,
    pub condition: TagSearchCondition,
    /// Free-text filter over tag names.
    pub filter: String,
}
