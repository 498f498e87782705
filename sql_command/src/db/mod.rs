//! Database module for sql_command
//!
//! This module handles the connection lifecycle and command execution.

pub mod connection;
pub mod executor;
pub mod session;
pub mod statement;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types
pub use connection::{ConnectionManager, DatabaseConnection};
pub use executor::CommandExecutor;
pub use session::Session;
