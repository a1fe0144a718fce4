// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The write flows in domains/entities/actions.rs decide when to call them.
//
// Naming convention: Base* for trait names (e.g., BaseValidator, BasePermissions)

use async_trait::async_trait;
use thiserror::Error;

// =============================================================================
// Collaborator errors
// =============================================================================

/// Failure talking to an external collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The collaborator answered with a non-success status.
    #[error("{service} rejected the request with status {status}: {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The collaborator could not be reached or answered garbage.
    #[error("{service} unavailable: {source}")]
    Unavailable {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

// =============================================================================
// Validation Trait (dry-run writes against the repository)
// =============================================================================

#[async_trait]
pub trait BaseValidator: Send + Sync {
    /// Dry-run a PUT of `entity` as `resource/id`. Any rejection aborts the write.
    async fn validate_put(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        entity: &serde_json::Value,
    ) -> Result<(), CollaboratorError>;

    /// Dry-run a DELETE of `resource/id`.
    async fn validate_delete(
        &self,
        token: &str,
        resource: &str,
        id: &str,
    ) -> Result<(), CollaboratorError>;
}

// =============================================================================
// Permission Trait
// =============================================================================

/// Access rights understood by the permission service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Right {
    Write,
    Administrate,
}

impl Right {
    pub fn as_str(&self) -> &'static str {
        match self {
            Right::Write => "w",
            Right::Administrate => "a",
        }
    }
}

#[async_trait]
pub trait BasePermissions: Send + Sync {
    /// Whether the caller holds `right` on `resource/id`.
    async fn check(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        right: Right,
    ) -> Result<bool, CollaboratorError>;

    /// Record `owner` as the owner of a newly created `resource/id`.
    async fn set_owner(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        owner: &str,
    ) -> Result<(), CollaboratorError>;
}
