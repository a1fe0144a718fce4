//! Kernel module - server infrastructure and dependencies.

pub mod collaborators;
pub mod deps;
pub mod test_dependencies;
pub mod traits;

pub use collaborators::{HttpPermissions, HttpValidator};
pub use deps::{ServerDeps, SyncWaitConfig, DEFAULT_SYNC_WAIT_HANDLER};
pub use test_dependencies::{MockPermissions, MockValidator, TestDependencies, ValidationCall};
pub use traits::*;
