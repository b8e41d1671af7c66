//! Typed backend event feed.
//!
//! The backend pushes unsolicited events over the same socket as RPC
//! responses. Event kinds form a closed set: the coordinator matches on
//! [`BackendEvent`] exhaustively, so a newly added kind is a compile
//! error at every dispatch site rather than a silently missing listener.

use serde::Deserialize;
use serde_json::Value;

use crate::model::{
    ClientConnection, ConnectionId, EntityId, EntityPatch, EnvId, EnvSummary, FileHash,
    FileRecord, Tag, TagId, ThumbUpdate, ThumbnailState,
};
use crate::wire::EventFrame;

/// Wire names for every event the backend emits.
pub mod names {
    pub const ADD_CONNECTION: &str = "add-connection";
    pub const REMOVE_CONNECTION: &str = "remove-connection";
    pub const CREATE_ENVIRONMENT: &str = "create-environment";
    pub const CLOSE_ENVIRONMENT: &str = "close-environment";
    pub const UPDATE_ENV_SUMMARY: &str = "update-env-summary";
    pub const ENV_ADD_ENTITIES: &str = "env-add-entities";
    pub const ENV_UPDATE_ENTITIES: &str = "env-update-entities";
    pub const ENV_REMOVE_ENTITIES: &str = "env-remove-entities";
    pub const ENV_ADD_FILES: &str = "env-add-files";
    pub const ENV_REMOVE_FILES: &str = "env-remove-files";
    pub const ENV_UPDATE_THUMBS: &str = "env-update-thumbs";
    pub const ENV_ADD_TAGS: &str = "env-add-tags";
    pub const ENV_TAG_FILES: &str = "env-tag-files";
    pub const ENV_UNTAG_FILES: &str = "env-untag-files";
}

// Payload shells for the env-scoped composite events.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntitiesPayload {
    id: EnvId,
    entities: Vec<EntityPatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityIdsPayload {
    id: EnvId,
    entity_ids: Vec<EntityId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilesPayload {
    id: EnvId,
    files: Vec<FileRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HashesPayload {
    id: EnvId,
    hashes: Vec<FileHash>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThumbsPayload {
    id: EnvId,
    thumbs: Vec<ThumbUpdate>,
    thumb_state: ThumbnailState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagsPayload {
    id: EnvId,
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagFilesPayload {
    id: EnvId,
    entities: Vec<EntityPatch>,
    tag_ids: Vec<TagId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UntagFilesPayload {
    id: EnvId,
    entity_ids: Vec<EntityId>,
    tag_ids: Vec<TagId>,
}

/// A parsed backend event.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    AddConnection(ClientConnection),
    RemoveConnection(ConnectionId),
    CreateEnvironment(EnvSummary),
    CloseEnvironment(EnvId),
    UpdateEnvSummary(EnvSummary),
    EnvAddEntities {
        id: EnvId,
        entities: Vec<EntityPatch>,
    },
    EnvUpdateEntities {
        id: EnvId,
        entities: Vec<EntityPatch>,
    },
    EnvRemoveEntities {
        id: EnvId,
        entity_ids: Vec<EntityId>,
    },
    EnvAddFiles {
        id: EnvId,
        files: Vec<FileRecord>,
    },
    EnvRemoveFiles {
        id: EnvId,
        hashes: Vec<FileHash>,
    },
    EnvUpdateThumbs {
        id: EnvId,
        thumbs: Vec<ThumbUpdate>,
        thumb_state: ThumbnailState,
    },
    EnvAddTags {
        id: EnvId,
        tags: Vec<Tag>,
    },
    EnvTagFiles {
        id: EnvId,
        entities: Vec<EntityPatch>,
        tag_ids: Vec<TagId>,
    },
    EnvUntagFiles {
        id: EnvId,
        entity_ids: Vec<EntityId>,
        tag_ids: Vec<TagId>,
    },
}

impl BackendEvent {
    /// Parse a raw event frame into a typed event.
    ///
    /// Returns `Ok(None)` for event names outside the known set (the
    /// caller decides whether to warn) and `Err` when a known event
    /// carries a malformed payload.
    pub fn parse(frame: &EventFrame) -> Result<Option<Self>, serde_json::Error> {
        fn de<T: serde::de::DeserializeOwned>(payload: &Value) -> Result<T, serde_json::Error> {
            serde_json::from_value(payload.clone())
        }

        let event = match frame.event.as_str() {
            names::ADD_CONNECTION => Self::AddConnection(de(&frame.payload)?),
            names::REMOVE_CONNECTION => Self::RemoveConnection(de(&frame.payload)?),
            names::CREATE_ENVIRONMENT => Self::CreateEnvironment(de(&frame.payload)?),
            names::CLOSE_ENVIRONMENT => Self::CloseEnvironment(de(&frame.payload)?),
            names::UPDATE_ENV_SUMMARY => Self::UpdateEnvSummary(de(&frame.payload)?),
            names::ENV_ADD_ENTITIES => {
                let p: EntitiesPayload = de(&frame.payload)?;
                Self::EnvAddEntities {
                    id: p.id,
                    entities: p.entities,
                }
            }
            names::ENV_UPDATE_ENTITIES => {
                let p: EntitiesPayload = de(&frame.payload)?;
                Self::EnvUpdateEntities {
                    id: p.id,
                    entities: p.entities,
                }
            }
            names::ENV_REMOVE_ENTITIES => {
                let p: EntityIdsPayload = de(&frame.payload)?;
                Self::EnvRemoveEntities {
                    id: p.id,
                    entity_ids: p.entity_ids,
                }
            }
            names::ENV_ADD_FILES => {
                let p: FilesPayload = de(&frame.payload)?;
                Self::EnvAddFiles {
                    id: p.id,
                    files: p.files,
                }
            }
            names::ENV_REMOVE_FILES => {
                let p: HashesPayload = de(&frame.payload)?;
                Self::EnvRemoveFiles {
                    id: p.id,
                    hashes: p.hashes,
                }
            }
            names::ENV_UPDATE_THUMBS => {
                let p: ThumbsPayload = de(&frame.payload)?;
                Self::EnvUpdateThumbs {
                    id: p.id,
                    thumbs: p.thumbs,
                    thumb_state: p.thumb_state,
                }
            }
            names::ENV_ADD_TAGS => {
                let p: TagsPayload = de(&frame.payload)?;
                Self::EnvAddTags {
                    id: p.id,
                    tags: p.tags,
                }
            }
            names::ENV_TAG_FILES => {
                let p: TagFilesPayload = de(&frame.payload)?;
                Self::EnvTagFiles {
                    id: p.id,
                    entities: p.entities,
                    tag_ids: p.tag_ids,
                }
            }
            names::ENV_UNTAG_FILES => {
                let p: UntagFilesPayload = de(&frame.payload)?;
                Self::EnvUntagFiles {
                    id: p.id,
                    entity_ids: p.entity_ids,
                    tag_ids: p.tag_ids,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// The owning environment id, for environment-scoped events.
    pub fn env_id(&self) -> Option<&EnvId> {
        match self {
            Self::AddConnection(_) | Self::RemoveConnection(_) => None,
            Self::CreateEnvironment(summary) | Self::UpdateEnvSummary(summary) => {
                Some(&summary.id)
            }
            Self::CloseEnvironment(id)
            | Self::EnvAddEntities { id, .. }
            | Self::EnvUpdateEntities { id, .. }
            | Self::EnvRemoveEntities { id, .. }
            | Self::EnvAddFiles { id, .. }
            | Self::EnvRemoveFiles { id, .. }
            | Self::EnvUpdateThumbs { id, .. }
            | Self::EnvAddTags { id, .. }
            | Self::EnvTagFiles { id, .. }
            | Self::EnvUntagFiles { id, .. } => Some(id),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(event: &str, payload: Value) -> EventFrame {
        EventFrame {
            event: event.to_owned(),
            payload,
        }
    }

    #[test]
    fn parse_add_connection() {
        let f = frame(
            names::ADD_CONNECTION,
            json!({"id": "c1", "ip": "10.0.0.5", "localClient": false, "userAgent": "Firefox"}),
        );
        let Some(BackendEvent::AddConnection(conn)) = BackendEvent::parse(&f).unwrap() else {
            panic!("expected AddConnection");
        };
        assert_eq!(conn.id.as_str(), "c1");
        assert_eq!(conn.ip, "10.0.0.5");
    }

    #[test]
    fn parse_env_tag_files() {
        let f = frame(
            names::ENV_TAG_FILES,
            json!({
                "id": "env1",
                "entities": [{"id": "e1", "hash": "aaaaaaaaaaaa"}],
                "tagIds": ["t1", "t2"]
            }),
        );
        let Some(BackendEvent::EnvTagFiles {
            id,
            entities,
            tag_ids,
        }) = BackendEvent::parse(&f).unwrap()
        else {
            panic!("expected EnvTagFiles");
        };
        assert_eq!(id.as_str(), "env1");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].hash.as_ref().unwrap().as_str(), "aaaaaaaaaaaa");
        assert_eq!(tag_ids.len(), 2);
    }

    #[test]
    fn parse_env_update_thumbs() {
        let f = frame(
            names::ENV_UPDATE_THUMBS,
            json!({
                "id": "env1",
                "thumbs": [{"hash": "bbbbbbbbbbbb", "thumbName": "b.jpg"}],
                "thumbState": 2
            }),
        );
        let Some(BackendEvent::EnvUpdateThumbs { thumb_state, .. }) =
            BackendEvent::parse(&f).unwrap()
        else {
            panic!("expected EnvUpdateThumbs");
        };
        assert_eq!(thumb_state, ThumbnailState::Ready);
    }

    #[test]
    fn unknown_event_name_is_none() {
        let f = frame("env-reticulate-splines", json!({"id": "env1"}));
        assert!(BackendEvent::parse(&f).unwrap().is_none());
    }

    #[test]
    fn known_event_with_bad_payload_is_err() {
        let f = frame(names::ENV_REMOVE_FILES, json!({"id": "env1"}));
        assert!(BackendEvent::parse(&f).is_err());
    }

    #[test]
    fn env_id_scoping() {
        let f = frame(
            names::ENV_REMOVE_FILES,
            json!({"id": "env9", "hashes": ["cccccccccccc"]}),
        );
        let event = BackendEvent::parse(&f).unwrap().unwrap();
        assert_eq!(event.env_id().unwrap().as_str(), "env9");

        let f = frame(names::REMOVE_CONNECTION, json!("c1"));
        let event = BackendEvent::parse(&f).unwrap().unwrap();
        assert!(event.env_id().is_none());
    }
}
