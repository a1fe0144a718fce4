// HTTP routes
pub mod entities;
pub mod health;

pub use entities::*;
pub use health::*;
