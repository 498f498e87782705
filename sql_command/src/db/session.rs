//! The seam between command execution and the database driver

use async_trait::async_trait;

use crate::db::statement::PreparedStatement;
use crate::value::CommandResult;

/// A live database session that can run prepared statements.
///
/// Implementations are driven by one caller at a time; every method takes
/// `&mut self`, so a session cannot be shared between concurrent calls.
#[async_trait]
pub trait Session: Send {
    /// Execute a batch of statements and return the result of the last one.
    ///
    /// A batch of more than one statement runs atomically.
    async fn execute(&mut self, batch: &[PreparedStatement]) -> Result<CommandResult, sqlx::Error>;

    /// Roll back whatever the last failed call left behind.
    async fn rollback(&mut self) -> Result<(), sqlx::Error>;

    /// Release the session.
    async fn close(self) -> Result<(), sqlx::Error>
    where
        Self: Sized;

    /// Name used in log records
    fn backend_name(&self) -> &'static str;
}
