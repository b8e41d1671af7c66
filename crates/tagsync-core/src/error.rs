//! Sync engine errors.

use tagsync_api::model::EnvId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A backend call failed.
    #[error(transparent)]
    Api(#[from] tagsync_api::Error),

    /// Full-state reconciliation after (re)connect failed; the store
    /// may be stale until the next connect.
    #[error("state reconciliation failed: {source}")]
    Reconciliation {
        #[source]
        source: tagsync_api::Error,
    },

    /// An operation named an environment the store does not track.
    #[error("unknown environment: {0}")]
    UnknownEnvironment(EnvId),
}

impl Error {
    pub(crate) fn reconciliation(source: tagsync_api::Error) -> Self {
        Self::Reconciliation { source }
    }
}
