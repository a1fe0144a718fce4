// Device Manager - write API for the device graph
//
// Assigns ids to nested entity trees, publishes PUT/DELETE commands to the
// command log and optionally waits until downstream services confirmed them.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
