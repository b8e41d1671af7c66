//! Domain and wire types shared by the transport and the store.
//!
//! The backend is the single source of truth for these shapes, so the
//! wire representation doubles as the canonical model. Field names on
//! the wire are camelCase; every environment-scoped payload carries the
//! owning environment id.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ── String-keyed identifiers ─────────────────────────────────────────

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// One tagged collection (root directory) tracked by the backend.
    EnvId
);
string_id!(
    /// A tag record id, unique per environment.
    TagId
);
string_id!(
    /// A tagging entity id, unique per environment.
    EntityId
);
string_id!(
    /// An ephemeral connected-client id (lifetime = socket lifetime).
    ConnectionId
);

/// Stable fingerprint of a file path, the primary key across File and
/// Entity records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHash(pub String);

impl FileHash {
    /// Number of hex characters in a path fingerprint.
    const LEN: usize = 12;

    /// Fingerprint a nix-style path: the first 12 hex chars of its
    /// SHA-256 digest. Both sides of the contract derive directory keys
    /// from paths with this function.
    pub fn of_path(nix_path: &str) -> Self {
        let digest = Sha256::digest(nix_path.as_bytes());
        Self(hex::encode(digest)[..Self::LEN].to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FileHash {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Display for FileHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Environments ─────────────────────────────────────────────────────

/// Backend-authoritative summary of one open environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvSummary {
    pub id: EnvId,
    pub path: String,
    pub slug: String,
    pub name: String,
    pub icon: String,
    pub color: String,
}

// ── Tags ─────────────────────────────────────────────────────────────

/// A tag record. Tags are replaced whole on update — there is no
/// partial-update path for tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
}

// ── Entities ─────────────────────────────────────────────────────────

/// The tagging unit: attached to a file by content/path fingerprint,
/// independent of the file's current path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub hash: FileHash,
    #[serde(default)]
    pub is_dir: bool,
    /// Unique membership; append order preserved, never implicitly
    /// reordered.
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
}

/// A partial ("slim") entity record as carried by incremental events.
/// Absent fields preserve the existing value on merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    pub id: EntityId,
    #[serde(default)]
    pub hash: Option<FileHash>,
    #[serde(default)]
    pub is_dir: Option<bool>,
    #[serde(default)]
    pub tag_ids: Option<Vec<TagId>>,
}

// ── Files ────────────────────────────────────────────────────────────

/// Thumbnail generation state for a file, serialized as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ThumbnailState {
    /// No thumbnail can be generated for this file type.
    Impossible,
    /// A thumbnail could be generated but has not been requested yet.
    Possible,
    /// A thumbnail is available under `thumb_name`.
    Ready,
}

impl From<ThumbnailState> for u8 {
    fn from(state: ThumbnailState) -> Self {
        match state {
            ThumbnailState::Impossible => 0,
            ThumbnailState::Possible => 1,
            ThumbnailState::Ready => 2,
        }
    }
}

impl TryFrom<u8> for ThumbnailState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Impossible),
            1 => Ok(Self::Possible),
            2 => Ok(Self::Ready),
            other => Err(format!("unknown thumbnail state: {other}")),
        }
    }
}

/// A file record as the backend sends it.
///
/// `tag_ids` may ride along on the wire but tag membership lives only
/// on the Entity — the store strips it on merge. `entity_id` is a weak
/// back-reference used for lookup, not ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub hash: FileHash,
    pub nix_path: String,
    /// Base name including extension.
    pub base: String,
    pub ext: String,
    pub name: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub entity_id: Option<EntityId>,
    #[serde(default)]
    pub tag_ids: Option<Vec<TagId>>,
    #[serde(default)]
    pub thumb_name: Option<String>,
    #[serde(default)]
    pub thumb_state: Option<ThumbnailState>,
    /// Seconds since epoch at which the backend read this file.
    #[serde(default)]
    pub read_time: i64,
    /// For directories: hashes of direct children, when known.
    #[serde(default)]
    pub file_hashes: Option<Vec<FileHash>>,
}

/// Fingerprint of a file's parent directory.
///
/// The parent path is the nix path with `/<base>` removed; the
/// environment root is `"/"`. A `base` that is not actually the path's
/// last component falls back to splitting on the final separator, so a
/// malformed record can never fail the merge that carries it.
pub fn parent_dir_hash(nix_path: &str, base: &str) -> FileHash {
    let dir_path = nix_path
        .strip_suffix(base)
        .and_then(|rest| rest.strip_suffix('/'))
        .or_else(|| nix_path.rsplit_once('/').map(|(dir, _)| dir))
        .unwrap_or("");
    FileHash::of_path(if dir_path.is_empty() { "/" } else { dir_path })
}

impl FileRecord {
    /// Fingerprint of this file's parent directory path.
    pub fn parent_dir_hash(&self) -> FileHash {
        parent_dir_hash(&self.nix_path, &self.base)
    }
}

/// Per-hash thumbnail update as carried by thumbnail-state events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbUpdate {
    pub hash: FileHash,
    #[serde(default)]
    pub thumb_name: Option<String>,
}

// ── Connections ──────────────────────────────────────────────────────

/// This client's identity as assigned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetails {
    #[serde(default)]
    pub id: Option<ConnectionId>,
    #[serde(default)]
    pub local_client: bool,
}

/// Another client connected to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConnection {
    pub id: ConnectionId,
    pub ip: String,
    #[serde(default)]
    pub local_client: bool,
    #[serde(default)]
    pub user_agent: String,
}

// ── Bulk fetch results ───────────────────────────────────────────────

/// Numeric per-item error codes returned by `getEntityFiles`.
pub mod file_error_status {
    pub const FILE_DOESNT_EXIST: i64 = -1;
    pub const ENTITY_DOESNT_EXIST: i64 = -2;
}

/// One element of a `getEntityFiles` result: either a resolved file
/// record or a numeric error code for that entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityFileResult {
    Error(i64),
    File(Box<FileRecord>),
}

/// Result of a full directory listing fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryContents {
    pub directory: FileRecord,
    pub files: Vec<FileRecord>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn path_hash_is_stable_and_short() {
        let a = FileHash::of_path("/photos/cats");
        let b = FileHash::of_path("/photos/cats");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 12);
        assert_ne!(a, FileHash::of_path("/photos/dogs"));
    }

    #[test]
    fn parent_dir_hash_of_nested_file() {
        let file = FileRecord {
            hash: FileHash::of_path("/photos/cat.jpg"),
            nix_path: "/photos/cat.jpg".into(),
            base: "cat.jpg".into(),
            ext: "jpg".into(),
            name: "cat".into(),
            is_dir: false,
            entity_id: None,
            tag_ids: None,
            thumb_name: None,
            thumb_state: None,
            read_time: 0,
            file_hashes: None,
        };
        assert_eq!(file.parent_dir_hash(), FileHash::of_path("/photos"));
    }

    #[test]
    fn parent_dir_hash_of_root_child() {
        let file = FileRecord {
            hash: FileHash::of_path("/cat.jpg"),
            nix_path: "/cat.jpg".into(),
            base: "cat.jpg".into(),
            ext: "jpg".into(),
            name: "cat".into(),
            is_dir: false,
            entity_id: None,
            tag_ids: None,
            thumb_name: None,
            thumb_state: None,
            read_time: 0,
            file_hashes: None,
        };
        assert_eq!(file.parent_dir_hash(), FileHash::of_path("/"));
    }

    #[test]
    fn parent_dir_hash_tolerates_mismatched_base() {
        // Multibyte path with an empty base: must not panic, and the
        // root child resolves to the root directory.
        assert_eq!(parent_dir_hash("/é", ""), FileHash::of_path("/"));

        // Base that is not a suffix of the path: fall back to the last
        // separator instead of byte arithmetic.
        assert_eq!(
            parent_dir_hash("/photos/猫.jpg", "cat.jpg"),
            FileHash::of_path("/photos")
        );

        // No separator at all resolves to the root.
        assert_eq!(parent_dir_hash("猫.jpg", "猫.jpg"), FileHash::of_path("/"));
    }

    #[test]
    fn entity_file_result_decodes_both_shapes() {
        let err: EntityFileResult = serde_json::from_str("-2").unwrap();
        assert!(matches!(
            err,
            EntityFileResult::Error(file_error_status::ENTITY_DOESNT_EXIST)
        ));

        let file: EntityFileResult = serde_json::from_value(serde_json::json!({
            "hash": "abc123abc123",
            "nixPath": "/a.txt",
            "base": "a.txt",
            "ext": "txt",
            "name": "a",
            "isDir": false,
            "readTime": 100
        }))
        .unwrap();
        assert!(matches!(file, EntityFileResult::File(_)));
    }

    #[test]
    fn thumbnail_state_round_trips_as_integer() {
        let json = serde_json::to_string(&ThumbnailState::Ready).unwrap();
        assert_eq!(json, "2");
        let state: ThumbnailState = serde_json::from_str("1").unwrap();
        assert_eq!(state, ThumbnailState::Possible);
        assert!(serde_json::from_str::<ThumbnailState>("7").is_err());
    }
}
