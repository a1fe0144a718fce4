// Domain modules
pub mod entities;
