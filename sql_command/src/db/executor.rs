//! SQL command executor
//!
//! Loads a command file, binds its parameters and runs it on the shared
//! session. Any execution failure is followed by a rollback so the session
//! stays usable for the next command.

use std::path::Path;

use crate::db::session::Session;
use crate::db::statement::{plan_parameters, split_statements};
use crate::error::{Error, Result};
use crate::value::{CommandResult, SqlValue};

/// Read a command file as UTF-8 text
pub async fn load_command(path: &Path) -> Result<String> {
    let load_error = |message: String| Error::CommandLoadError {
        path: path.display().to_string(),
        message,
    };

    let bytes = tokio::fs::read(path).await.map_err(|e| load_error(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| load_error(format!("not valid UTF-8: {}", e)))
}

/// Runs command files against a borrowed session
pub struct CommandExecutor<'s, S: Session> {
    session: &'s mut S,
}

impl<'s, S: Session> CommandExecutor<'s, S> {
    /// Create a new executor over `session`
    pub fn new(session: &'s mut S) -> Self {
        Self { session }
    }

    /// Load `file_path` and execute it with positional `params`.
    ///
    /// A load failure never reaches the session. An execution failure rolls
    /// the session back before the error is returned.
    pub async fn run(&mut self, file_path: impl AsRef<Path>, params: &[SqlValue]) -> Result<CommandResult> {
        let path = file_path.as_ref();
        let file = path.display().to_string();

        let text = match load_command(path).await {
            Ok(text) => {
                tracing::debug!(file = %file, "File opened successfully");
                text
            }
            Err(e) => {
                tracing::error!(file = %file, error = %e, "Failure to open command file");
                return Err(e);
            }
        };

        self.run_text(&file, &text, params).await
    }

    /// Execute command text that was already loaded from `source`
    pub async fn run_text(&mut self, source: &str, text: &str, params: &[SqlValue]) -> Result<CommandResult> {
        let statements = split_statements(text);
        if statements.is_empty() {
            tracing::error!(file = %source, "Command file has no statements");
            return Err(Error::CommandLoadError {
                path: source.to_string(),
                message: "file contains no statements".to_string(),
            });
        }

        let batch = match plan_parameters(statements, params) {
            Ok(batch) => batch,
            Err(message) => return Err(self.fail(source, message).await),
        };

        tracing::debug!(
            file = %source,
            statements = batch.len(),
            params = params.len(),
            "Executing command"
        );

        match self.session.execute(&batch).await {
            Ok(result) => {
                match &result {
                    CommandResult::Rows { rows, .. } => {
                        tracing::info!(file = %source, rows = rows.len(), "Command executed successfully")
                    }
                    CommandResult::NoRows { rows_affected } => {
                        tracing::info!(file = %source, rows_affected, "Command executed successfully")
                    }
                }
                Ok(result)
            }
            Err(e) => Err(self.fail(source, e.to_string()).await),
        }
    }

    /// Roll back, log and build the execution error
    async fn fail(&mut self, source: &str, message: String) -> Error {
        if let Err(e) = self.session.rollback().await {
            tracing::warn!(file = %source, error = %e, "Rollback after failed command also failed");
        }
        tracing::error!(file = %source, error = %message, "Execution failure");
        Error::CommandExecutionError(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::MockSession;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write_sql(dir: &TempDir, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    fn leaderboard_rows() -> CommandResult {
        CommandResult::Rows {
            columns: vec!["name".into(), "score".into()],
            rows: vec![
                vec![SqlValue::from("carol"), SqlValue::Int(1500)],
                vec![SqlValue::from("bob"), SqlValue::Int(1200)],
                vec![SqlValue::from("alice"), SqlValue::Int(900)],
            ],
        }
    }

    #[tokio::test]
    async fn test_insert_binds_parameter_and_returns_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sql(&dir, "add_user.sql", "INSERT INTO users(name) VALUES (%s)");
        let mut session = MockSession::new().then_ok(CommandResult::NoRows { rows_affected: 1 });
        let log = session.log();

        let result = CommandExecutor::new(&mut session)
            .run(&path, &[SqlValue::from("alice")])
            .await
            .unwrap();

        assert_eq!(result, CommandResult::NoRows { rows_affected: 1 });
        let log = log.lock().unwrap();
        assert_eq!(log.executed.len(), 1);
        assert_eq!(log.executed[0][0].sql, "INSERT INTO users(name) VALUES ($1)");
        assert_eq!(log.executed[0][0].params, vec![SqlValue::from("alice")]);
        assert_eq!(log.rollbacks, 0);
    }

    #[tokio::test]
    async fn test_query_returns_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sql(
            &dir,
            "get_leaderboard.sql",
            "SELECT * FROM leaderboard ORDER BY score DESC LIMIT %s",
        );
        let mut session = MockSession::new().then_ok(leaderboard_rows());

        let result = CommandExecutor::new(&mut session)
            .run(&path, &[SqlValue::Int(3)])
            .await
            .unwrap();

        assert_eq!(result.rows().unwrap().len(), 3);
        assert_eq!(result.rows().unwrap()[0][0], SqlValue::from("carol"));
    }

    #[tokio::test]
    async fn test_missing_file_never_reaches_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MockSession::new();
        let log = session.log();

        let err = CommandExecutor::new(&mut session)
            .run(dir.path().join("nope.sql"), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CommandLoadError { .. }));
        let log = log.lock().unwrap();
        assert!(log.executed.is_empty());
        assert_eq!(log.rollbacks, 0);
    }

    #[tokio::test]
    async fn test_blank_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sql(&dir, "blank.sql", "  \n-- nothing to do\n");
        let mut session = MockSession::new();
        let log = session.log();

        let err = CommandExecutor::new(&mut session).run(&path, &[]).await.unwrap_err();

        assert!(matches!(err, Error::CommandLoadError { .. }));
        assert!(log.lock().unwrap().executed.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.sql");
        fs::write(&path, [0x53, 0x45, 0x4c, 0xff, 0xfe]).unwrap();
        let mut session = MockSession::new();

        let err = CommandExecutor::new(&mut session).run(&path, &[]).await.unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_session_stays_usable() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_sql(&dir, "bad.sql", "SELECT * FROM no_such_table");
        let good = write_sql(&dir, "good.sql", "SELECT 1");
        let mut session = MockSession::new()
            .then_fail("relation \"no_such_table\" does not exist")
            .then_ok(CommandResult::Rows {
                columns: vec!["?column?".into()],
                rows: vec![vec![SqlValue::Int(1)]],
            });
        let log = session.log();
        let mut executor = CommandExecutor::new(&mut session);

        let err = executor.run(&bad, &[]).await.unwrap_err();
        assert!(matches!(err, Error::CommandExecutionError(_)));
        assert!(err.to_string().contains("no_such_table"));

        let result = executor.run(&good, &[]).await.unwrap();
        assert_eq!(result.rows().unwrap(), &[vec![SqlValue::Int(1)]]);

        let log = log.lock().unwrap();
        assert_eq!(log.rollbacks, 1);
        assert_eq!(log.executed.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_rollback_keeps_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sql(&dir, "bad.sql", "INSERT INTO users(id) VALUES (1)");
        let mut session = MockSession::new()
            .then_fail("duplicate key value violates unique constraint")
            .failing_rollback();

        let err = CommandExecutor::new(&mut session).run(&path, &[]).await.unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
    }

    #[tokio::test]
    async fn test_placeholder_mismatch_is_execution_error_without_sending() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sql(&dir, "limit.sql", "SELECT * FROM leaderboard LIMIT %s");
        let mut session = MockSession::new();
        let log = session.log();

        let err = CommandExecutor::new(&mut session)
            .run(&path, &[SqlValue::Int(1), SqlValue::Int(2)])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CommandExecutionError(_)));
        let log = log.lock().unwrap();
        assert!(log.executed.is_empty());
        assert_eq!(log.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_multi_statement_file_is_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sql(
            &dir,
            "record_match.sql",
            "INSERT INTO matches(winner, loser) VALUES (%s, %s);\nSELECT count(*) FROM matches;",
        );
        let mut session = MockSession::new();
        let log = session.log();

        CommandExecutor::new(&mut session)
            .run(&path, &[SqlValue::from("alice"), SqlValue::from("bob")])
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.executed.len(), 1);
        assert_eq!(log.executed[0].len(), 2);
        assert_eq!(log.executed[0][1].params, Vec::<SqlValue>::new());
    }
}
