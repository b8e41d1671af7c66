//! Typed method surface over the raw transport.
//!
//! One async method per remote method, mirroring the backend's RPC set.
//! Payloads serialize to the camelCase wire shape; results deserialize
//! into the shared model types.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::Error;
use crate::model::{
    ClientConnection, ClientDetails, DirectoryContents, Entity, EntityFileResult, EntityId, EnvId,
    EnvSummary, Tag, TagId,
};
use crate::transport::Transport;

// ── Payload shells ───────────────────────────────────────────────────

#[derive(Serialize)]
struct EnvScope<'a> {
    id: &'a EnvId,
}

#[derive(Serialize)]
struct PathPayload<'a> {
    id: &'a EnvId,
    path: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntityIdsPayload<'a> {
    id: &'a EnvId,
    entity_ids: &'a [EntityId],
}

#[derive(Serialize)]
struct PathsPayload<'a> {
    id: &'a EnvId,
    paths: &'a [String],
}

#[derive(Serialize)]
struct TagPayload<'a> {
    id: &'a EnvId,
    tag: &'a Tag,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TagIdPayload<'a> {
    id: &'a EnvId,
    tag_id: &'a TagId,
}

/// Partial environment property update. Absent fields stay untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnvPropertyPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Serialize)]
struct EnvPropertyPayload<'a> {
    id: &'a EnvId,
    #[serde(flatten)]
    patch: &'a EnvPropertyPatch,
}

// ── BackendHandle ────────────────────────────────────────────────────

/// Typed client for the backend's request/response surface.
#[derive(Clone)]
pub struct BackendHandle {
    transport: Transport,
}

impl BackendHandle {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// The underlying transport (event feed, connection watch).
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    async fn invoke<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        payload: &P,
    ) -> Result<R, Error> {
        debug!(method, "backend call");
        let result = self
            .transport
            .call(method, serde_json::to_value(payload)?)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Invoke a method whose result we don't consume.
    async fn invoke_unit<P: Serialize>(&self, method: &str, payload: &P) -> Result<(), Error> {
        let _: Value = self.invoke(method, payload).await?;
        Ok(())
    }

    // ── Identity & connections ───────────────────────────────────────

    pub async fn get_client_details(&self) -> Result<ClientDetails, Error> {
        self.invoke("getClientDetails", &Value::Null).await
    }

    pub async fn get_connection_list(&self) -> Result<Vec<ClientConnection>, Error> {
        self.invoke("getConnectionList", &Value::Null).await
    }

    // ── Environments ─────────────────────────────────────────────────

    pub async fn get_summaries(&self) -> Result<Vec<EnvSummary>, Error> {
        self.invoke("getSummaries", &Value::Null).await
    }

    pub async fn set_env_property(
        &self,
        id: &EnvId,
        patch: &EnvPropertyPatch,
    ) -> Result<(), Error> {
        self.invoke_unit("setEnvProperty", &EnvPropertyPayload { id, patch })
            .await
    }

    pub async fn close_environment(&self, id: &EnvId) -> Result<(), Error> {
        self.invoke_unit("closeEnvironment", &EnvScope { id }).await
    }

    // ── Tags ─────────────────────────────────────────────────────────

    pub async fn get_all_tags(&self, id: &EnvId) -> Result<Vec<Tag>, Error> {
        self.invoke("getAllTags", &EnvScope { id }).await
    }

    pub async fn update_tag(&self, id: &EnvId, tag: &Tag) -> Result<(), Error> {
        self.invoke_unit("updateTag", &TagPayload { id, tag }).await
    }

    pub async fn remove_tag(&self, id: &EnvId, tag_id: &TagId) -> Result<(), Error> {
        self.invoke_unit("removeTag", &TagIdPayload { id, tag_id })
            .await
    }

    // ── Entities ─────────────────────────────────────────────────────

    pub async fn get_all_entities(&self, id: &EnvId) -> Result<Vec<Entity>, Error> {
        self.invoke("getAllEntities", &EnvScope { id }).await
    }

    /// Resolve file records for a batch of entity ids.
    ///
    /// The result preserves input order; individual elements may be
    /// numeric error codes rather than files. Callers chunk large id
    /// lists before invoking this.
    pub async fn get_entity_files(
        &self,
        id: &EnvId,
        entity_ids: &[EntityId],
    ) -> Result<Vec<EntityFileResult>, Error> {
        self.invoke("getEntityFiles", &EntityIdsPayload { id, entity_ids })
            .await
    }

    // ── Files & thumbnails ───────────────────────────────────────────

    pub async fn get_directory_contents(
        &self,
        id: &EnvId,
        path: &str,
    ) -> Result<DirectoryContents, Error> {
        self.invoke("getDirectoryContents", &PathPayload { id, path })
            .await
    }

    pub async fn request_file_thumbnails(
        &self,
        id: &EnvId,
        paths: &[String],
    ) -> Result<(), Error> {
        self.invoke_unit("requestFileThumbnails", &PathsPayload { id, paths })
            .await
    }
}
