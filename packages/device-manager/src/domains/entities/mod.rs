//! Entity write flows.
//!
//! ```text
//! HTTP body ─► assign ids ─► permission check (update/delete)
//!          ─► dry-run validation ─► register wait (wait=true)
//!          ─► publish PUT/DELETE ─► record owner (create)
//!          ─► await completion ─► response
//! ```

pub mod actions;
pub mod errors;
pub mod kind;
pub mod models;

pub use actions::{create_entity, delete_entity, update_entity, Completion, WriteResult};
pub use errors::WriteError;
pub use kind::{EntityKind, Resource};
pub use models::*;
