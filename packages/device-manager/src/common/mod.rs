// Shared building blocks
pub mod auth;
pub mod identity;

pub use auth::Caller;
pub use identity::*;
