// TestDependencies - fake collaborators for testing
//
// Provides an in-memory log, a completion waiter and recording fakes for the
// validation and permission services, wired into a ServerDeps.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use command_log::memory::MemoryLog;
use command_log::{CommandPublisher, CompletionWaiter, PublisherConfig};

use super::{BasePermissions, BaseValidator, CollaboratorError, Right, ServerDeps, SyncWaitConfig};
use crate::common::IdMinter;
use crate::domains::entities::EntityKind;

// =============================================================================
// Mock Validator
// =============================================================================

/// A dry-run call captured by [`MockValidator`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationCall {
    Put {
        token: String,
        resource: String,
        id: String,
        entity: serde_json::Value,
    },
    Delete {
        token: String,
        resource: String,
        id: String,
    },
}

#[derive(Default)]
pub struct MockValidator {
    rejection: Option<(u16, String)>,
    calls: Mutex<Vec<ValidationCall>>,
}

impl MockValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every dry-run with `status`.
    pub fn rejecting(mut self, status: u16, message: &str) -> Self {
        self.rejection = Some((status, message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<ValidationCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn outcome(&self) -> Result<(), CollaboratorError> {
        match &self.rejection {
            Some((status, message)) => Err(CollaboratorError::Rejected {
                service: "device-repository",
                status: *status,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BaseValidator for MockValidator {
    async fn validate_put(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        entity: &serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(ValidationCall::Put {
            token: token.to_string(),
            resource: resource.to_string(),
            id: id.to_string(),
            entity: entity.clone(),
        });
        self.outcome()
    }

    async fn validate_delete(
        &self,
        token: &str,
        resource: &str,
        id: &str,
    ) -> Result<(), CollaboratorError> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(ValidationCall::Delete {
            token: token.to_string(),
            resource: resource.to_string(),
            id: id.to_string(),
        });
        self.outcome()
    }
}

// =============================================================================
// Mock Permissions
// =============================================================================

pub struct MockPermissions {
    allow: bool,
    owner_rejection: Option<(u16, String)>,
    checks: Mutex<Vec<(String, String, Right)>>,
    owners: Mutex<Vec<(String, String, String)>>,
}

impl MockPermissions {
    pub fn new() -> Self {
        Self {
            allow: true,
            owner_rejection: None,
            checks: Mutex::new(Vec::new()),
            owners: Mutex::new(Vec::new()),
        }
    }

    /// Deny every check.
    pub fn denying(mut self) -> Self {
        self.allow = false;
        self
    }

    /// Reject every ownership record with `status`.
    pub fn failing_set_owner(mut self, status: u16, message: &str) -> Self {
        self.owner_rejection = Some((status, message.to_string()));
        self
    }

    /// `(resource, id, right)` of every check, in call order.
    pub fn checks(&self) -> Vec<(String, String, Right)> {
        self.checks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// `(resource, id, owner)` of every ownership record, in call order.
    pub fn owners(&self) -> Vec<(String, String, String)> {
        self.owners.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MockPermissions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BasePermissions for MockPermissions {
    async fn check(
        &self,
        _token: &str,
        resource: &str,
        id: &str,
        right: Right,
    ) -> Result<bool, CollaboratorError> {
        self.checks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((resource.to_string(), id.to_string(), right));
        Ok(self.allow)
    }

    async fn set_owner(
        &self,
        _token: &str,
        resource: &str,
        id: &str,
        owner: &str,
    ) -> Result<(), CollaboratorError> {
        self.owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((resource.to_string(), id.to_string(), owner.to_string()));
        match &self.owner_rejection {
            Some((status, message)) => Err(CollaboratorError::Rejected {
                service: "permission-search",
                status: *status,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub log: MemoryLog,
    pub waiter: CompletionWaiter,
    pub validator: Arc<MockValidator>,
    pub permissions: Arc<MockPermissions>,
    pub sync_wait: SyncWaitConfig,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            log: MemoryLog::new(),
            waiter: CompletionWaiter::new(),
            validator: Arc::new(MockValidator::new()),
            permissions: Arc::new(MockPermissions::new()),
            sync_wait: SyncWaitConfig::default(),
        }
    }

    /// Set a mock validator
    pub fn mock_validator(mut self, validator: MockValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Set mock permissions
    pub fn mock_permissions(mut self, permissions: MockPermissions) -> Self {
        self.permissions = Arc::new(permissions);
        self
    }

    /// Wait for `handlers` for at most `timeout` on `wait=true` requests.
    pub fn sync_wait(mut self, timeout: Duration, handlers: &[&str]) -> Self {
        self.sync_wait = SyncWaitConfig {
            timeout,
            handlers: handlers.iter().map(|h| h.to_string()).collect(),
        };
        self
    }

    pub fn into_server_deps(self) -> ServerDeps {
        let publisher = CommandPublisher::new(
            Arc::new(self.log),
            PublisherConfig {
                retry_backoff: Duration::from_millis(1),
                ..PublisherConfig::default()
            }
            .with_owner_scoped(EntityKind::owner_scoped_topics()),
        );
        ServerDeps::new(
            publisher,
            self.waiter,
            self.validator,
            self.permissions,
            IdMinter::default(),
            self.sync_wait,
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
