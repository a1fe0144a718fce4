use command_log::PublishError;
use thiserror::Error;

use crate::common::IdentityError;
use crate::kernel::CollaboratorError;

/// Why a write was not published (or, for ownership, not completed).
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("access denied: missing `{right}` right on {resource} `{id}`")]
    PermissionDenied {
        resource: String,
        id: String,
        right: &'static str,
    },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The PUT is on the log; only the ownership record is missing.
    #[error("{resource} `{id}` was written but its owner was not recorded: {source}")]
    OwnershipNotRecorded {
        resource: String,
        id: String,
        source: CollaboratorError,
    },

    #[error("failed to encode entity: {0}")]
    Encode(#[from] serde_json::Error),
}
