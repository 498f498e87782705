//! One-time database bootstrap
//!
//! Creates the application database from the administrative database, then
//! creates its tables and triggers. Every step is attempted even if an
//! earlier one failed, because the scripts are expected to be idempotent
//! and a rerun must be able to finish a half-done setup.

use std::path::Path;

use crate::config::DatabaseConfig;
use crate::db::{CommandExecutor, ConnectionManager, Session};
use crate::error::Error;

/// Script run against the administrative database
pub const CREATE_DATABASE_SCRIPT: &str = "create_database.sql";

/// Scripts run against the application database, in order
pub const SCHEMA_SCRIPTS: [&str; 2] = ["create_tables.sql", "create_triggers.sql"];

/// Outcome of one bootstrap step
#[derive(Debug)]
pub struct StepOutcome {
    pub step: String,
    pub error: Option<Error>,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcomes of every attempted step
#[derive(Debug, Default)]
pub struct SetupReport {
    pub steps: Vec<StepOutcome>,
}

impl SetupReport {
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(StepOutcome::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.succeeded())
    }

    fn record(&mut self, step: impl Into<String>, error: Option<Error>) {
        self.steps.push(StepOutcome {
            step: step.into(),
            error,
        });
    }
}

/// Run the full bootstrap with the scripts found in `sql_dir`
pub async fn run_setup(config: &DatabaseConfig, sql_dir: &Path) -> SetupReport {
    let mut report = SetupReport::default();

    tracing::info!(database = crate::config::ADMIN_DATABASE, "Attempting to create database");
    connect_and_run(&config.admin(), sql_dir, &[CREATE_DATABASE_SCRIPT], &mut report).await;

    tracing::info!(database = %config.database, "Attempting to create tables and triggers");
    connect_and_run(config, sql_dir, &SCHEMA_SCRIPTS, &mut report).await;

    report
}

async fn connect_and_run(config: &DatabaseConfig, sql_dir: &Path, scripts: &[&str], report: &mut SetupReport) {
    let step = format!("connect to {}", config.database);
    let mut manager = match ConnectionManager::open(config).await {
        Ok(manager) => manager,
        Err(e) => {
            report.record(step, Some(e));
            return;
        }
    };
    report.record(step, None);

    run_scripts(&mut manager, sql_dir, scripts, report).await;

    let closed = manager.close().await.err();
    report.record(format!("close {}", config.database), closed);
}

/// Run `scripts` in order on an open manager, recording each outcome
pub async fn run_scripts<S: Session>(
    manager: &mut ConnectionManager<S>,
    sql_dir: &Path,
    scripts: &[&str],
    report: &mut SetupReport,
) {
    for script in scripts {
        let outcome = match manager.session() {
            Ok(session) => CommandExecutor::new(session)
                .run(sql_dir.join(script), &[])
                .await
                .err(),
            Err(e) => Some(e),
        };

        match &outcome {
            None => tracing::info!(script, "Bootstrap step completed"),
            Some(e) => tracing::error!(script, error = %e, "Bootstrap step failed"),
        }
        report.record(*script, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::MockSession;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[tokio::test]
    async fn test_scripts_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("create_tables.sql"), "CREATE TABLE IF NOT EXISTS users(id serial, name text);").unwrap();
        fs::write(
            dir.path().join("create_triggers.sql"),
            "CREATE OR REPLACE FUNCTION f() RETURNS trigger AS $$ BEGIN RETURN NEW; END; $$ LANGUAGE plpgsql;",
        )
        .unwrap();

        let session = MockSession::new();
        let log = session.log();
        let mut manager = ConnectionManager::from_session(session);
        let mut report = SetupReport::default();

        run_scripts(&mut manager, dir.path(), &SCHEMA_SCRIPTS, &mut report).await;

        assert!(report.is_success());
        let names: Vec<&str> = report.steps.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(names, vec!["create_tables.sql", "create_triggers.sql"]);

        let log = log.lock().unwrap();
        assert_eq!(log.executed.len(), 2);
        assert!(log.executed[0][0].sql.starts_with("CREATE TABLE"));
        assert!(log.executed[1][0].sql.contains("RETURN NEW;"));
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_later_steps() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("create_triggers.sql"), "CREATE TRIGGER t AFTER INSERT ON users EXECUTE FUNCTION f();").unwrap();

        let session = MockSession::new();
        let log = session.log();
        let mut manager = ConnectionManager::from_session(session);
        let mut report = SetupReport::default();

        run_scripts(&mut manager, dir.path(), &SCHEMA_SCRIPTS, &mut report).await;

        assert!(!report.is_success());
        let failed: Vec<&str> = report.failures().map(|s| s.step.as_str()).collect();
        assert_eq!(failed, vec!["create_tables.sql"]);
        assert_eq!(log.lock().unwrap().executed.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_server_records_connect_failures() {
        let config = DatabaseConfig {
            user: "nobody".into(),
            password: "nothing".into(),
            host: "127.0.0.1".into(),
            port: 1,
            database: "royale".into(),
            connect_timeout_seconds: 2,
            enable_ssl: Some(false),
        };
        let dir = tempfile::tempdir().unwrap();

        let report = run_setup(&config, dir.path()).await;

        let failed: Vec<&str> = report.failures().map(|s| s.step.as_str()).collect();
        assert_eq!(failed, vec!["connect to postgres", "connect to royale"]);
        assert!(report
            .failures()
            .all(|s| matches!(s.error, Some(Error::ConnectError(_)))));
    }
}
