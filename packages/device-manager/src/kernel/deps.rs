//! Server dependencies for the write flows (using traits for testability)
//!
//! This module provides the central dependency container used by every HTTP
//! handler. External collaborators sit behind Base* traits so tests can swap
//! them for the fakes in `test_dependencies`.

use std::sync::Arc;
use std::time::Duration;

use command_log::{CommandPublisher, CompletionWaiter, DEFAULT_WAIT_TIMEOUT};

use crate::common::IdMinter;
use crate::kernel::{BasePermissions, BaseValidator};

/// Handler that applies commands in the device repository.
pub const DEFAULT_SYNC_WAIT_HANDLER: &str = "device-repository";

/// What a `wait=true` request waits for.
#[derive(Debug, Clone)]
pub struct SyncWaitConfig {
    pub timeout: Duration,
    /// Every handler that must confirm before the request returns.
    pub handlers: Vec<String>,
}

impl Default for SyncWaitConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            handlers: vec![DEFAULT_SYNC_WAIT_HANDLER.to_string()],
        }
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies accessible to handlers (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub publisher: CommandPublisher,
    pub waiter: CompletionWaiter,
    pub validator: Arc<dyn BaseValidator>,
    pub permissions: Arc<dyn BasePermissions>,
    pub id_minter: IdMinter,
    pub sync_wait: SyncWaitConfig,
    /// Broker connection, reported by the health endpoint. `None` in tests.
    pub nats: Option<async_nats::Client>,
}

impl ServerDeps {
    pub fn new(
        publisher: CommandPublisher,
        waiter: CompletionWaiter,
        validator: Arc<dyn BaseValidator>,
        permissions: Arc<dyn BasePermissions>,
        id_minter: IdMinter,
        sync_wait: SyncWaitConfig,
    ) -> Self {
        Self {
            publisher,
            waiter,
            validator,
            permissions,
            id_minter,
            sync_wait,
            nats: None,
        }
    }

    pub fn with_nats(mut self, client: async_nats::Client) -> Self {
        self.nats = Some(client);
        self
    }
}
