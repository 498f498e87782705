//! sql_command: run externally stored SQL command files against PostgreSQL
//!
//! A client owns exactly one connection. Each command is a SQL file plus an
//! optional literal payload of positional parameters; the result is either a
//! complete row set or nothing, and a failed command is rolled back so the
//! connection stays usable.
//!
//! The client is driven by one caller at a time. Methods take `&mut self`,
//! so concurrent use has to be serialised by the caller.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod params;
pub mod script;
pub mod utils;
pub mod value;

use std::path::Path;

// Re-export main types for easier access
pub use config::{Config, DatabaseConfig};
pub use db::{CommandExecutor, ConnectionManager, DatabaseConnection, Session};
pub use error::{Error, Result};
pub use value::{CommandResult, SqlValue};

/// Load configuration (from `config_path` or the environment) and connect
pub async fn init(config_path: Option<&str>) -> Result<PostgresClient> {
    let config = config::load(config_path)?;
    PostgresClient::new(config).await
}

/// The main client: one connection, any number of commands
pub struct PostgresClient<S: Session = DatabaseConnection> {
    manager: ConnectionManager<S>,
}

impl PostgresClient<DatabaseConnection> {
    /// Create a new client and open its connection
    pub async fn new(config: Config) -> Result<Self> {
        let manager = ConnectionManager::open(&config.database).await?;
        Ok(Self { manager })
    }
}

impl<S: Session> PostgresClient<S> {
    /// Build a client around an existing session
    pub fn from_session(session: S) -> Self {
        Self {
            manager: ConnectionManager::from_session(session),
        }
    }

    /// Run a command file with a literal payload such as `("alice",)`.
    ///
    /// `None` means no parameters. A payload that is not a plain literal is
    /// rejected before the file is even read.
    pub async fn run_command(&mut self, file_path: impl AsRef<Path>, payload: Option<&str>) -> Result<CommandResult> {
        let params = params::parse_optional(payload).map_err(|e| {
            tracing::error!(file = %file_path.as_ref().display(), error = %e, "Rejected command payload");
            e
        })?;
        self.run_command_with(file_path, &params).await
    }

    /// Run a command file with already typed parameters
    pub async fn run_command_with(&mut self, file_path: impl AsRef<Path>, params: &[SqlValue]) -> Result<CommandResult> {
        let session = self.manager.session()?;
        CommandExecutor::new(session).run(file_path, params).await
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_open()
    }

    /// Close the connection; safe to call more than once
    pub async fn close(&mut self) -> Result<()> {
        self.manager.close().await
    }
}
