//! Database connection handling
//!
//! This module establishes and releases the single session the client works
//! with. There is no pool: one `open` makes exactly one connection attempt.

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgTypeInfo};
use sqlx::{Column, Connection, Either, Executor, TypeInfo};
use std::collections::HashMap;

use crate::config::DatabaseConfig;
use crate::db::session::Session;
use crate::db::statement::{cast_parameters, PreparedStatement};
use crate::error::{Error, Result};
use crate::value::{bind_parameter, decode_row, CommandResult};

/// A live PostgreSQL connection in autocommit mode
#[derive(Debug)]
pub struct DatabaseConnection {
    conn: PgConnection,
}

impl DatabaseConnection {
    /// Connect with the configured timeout. One attempt, no retry.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        // Statements are described before they run; an uncached prepare keeps
        // the described parameter types from leaking into the bound ones.
        // Uncached statements are released by `DEALLOCATE ALL` after each batch.
        let options = config.connect_options().statement_cache_capacity(0);
        let timeout = config.connect_timeout();

        let conn = tokio::time::timeout(timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                Error::ConnectError(format!(
                    "timed out after {}s connecting to {}:{}/{}",
                    timeout.as_secs(),
                    config.host,
                    config.port,
                    config.database
                ))
            })?
            .map_err(|e| {
                Error::ConnectError(format!(
                    "{}:{}/{}: {}",
                    config.host, config.port, config.database, e
                ))
            })?;

        Ok(Self { conn })
    }
}

/// SQL spelling of a type, quoted and schema-qualified where needed
async fn cast_target(conn: &mut PgConnection, type_info: &PgTypeInfo) -> std::result::Result<String, sqlx::Error> {
    match type_info.oid() {
        Some(oid) => {
            sqlx::query_scalar::<_, String>("SELECT format_type($1, NULL)")
                .bind(oid)
                .persistent(false)
                .fetch_one(&mut *conn)
                .await
        }
        None => Ok(type_info.name().to_string()),
    }
}

/// Describe, bind and run one statement.
///
/// Parameters are bound with the types the server inferred for their
/// placeholders, so `3` reaches an `integer` argument and `'2025-11-24'`
/// reaches a `date` column.
async fn run_statement(
    conn: &mut PgConnection,
    statement: &PreparedStatement,
) -> std::result::Result<CommandResult, sqlx::Error> {
    let described = (&mut *conn).describe(&statement.sql).await?;
    let columns: Vec<String> = described
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    let param_types = match described.parameters() {
        Some(Either::Left(types)) => types.to_vec(),
        _ => Vec::new(),
    };

    let mut params = Vec::with_capacity(statement.params.len());
    let mut casts = HashMap::new();
    for (index, value) in statement.params.iter().enumerate() {
        let inferred = param_types.get(index);
        let binding = bind_parameter(value, inferred)
            .map_err(|message| sqlx::Error::Protocol(format!("parameter ${}: {}", index + 1, message)))?;
        if let (true, Some(type_info)) = (binding.text_cast, inferred) {
            casts.insert(index + 1, cast_target(conn, type_info).await?);
        }
        params.push(binding.param);
    }

    let sql = if casts.is_empty() {
        statement.sql.clone()
    } else {
        cast_parameters(&statement.sql, &casts)
    };

    let mut query = sqlx::query(&sql).persistent(false);
    for param in params {
        query = query.bind(param);
    }

    if columns.is_empty() {
        let done = query.execute(&mut *conn).await?;
        return Ok(CommandResult::NoRows {
            rows_affected: done.rows_affected(),
        });
    }

    let rows = query
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(decode_row)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(CommandResult::Rows { columns, rows })
}

impl DatabaseConnection {
    async fn execute_batch(&mut self, batch: &[PreparedStatement]) -> std::result::Result<CommandResult, sqlx::Error> {
        if let [statement] = batch {
            return run_statement(&mut self.conn, statement).await;
        }

        let mut tx = self.conn.begin().await?;
        let mut last = CommandResult::NoRows { rows_affected: 0 };
        for statement in batch {
            last = run_statement(&mut *tx, statement).await?;
        }
        tx.commit().await?;

        Ok(last)
    }
}

#[async_trait]
impl Session for DatabaseConnection {
    async fn execute(&mut self, batch: &[PreparedStatement]) -> std::result::Result<CommandResult, sqlx::Error> {
        let outcome = self.execute_batch(batch).await;
        // runs after a dropped transaction has been rolled back
        let released = self.conn.execute("DEALLOCATE ALL").await;

        let result = outcome?;
        released?;
        Ok(result)
    }

    async fn rollback(&mut self) -> std::result::Result<(), sqlx::Error> {
        self.conn.execute("ROLLBACK").await?;
        Ok(())
    }

    async fn close(self) -> std::result::Result<(), sqlx::Error> {
        self.conn.close().await
    }

    fn backend_name(&self) -> &'static str {
        "Postgres"
    }
}

/// Owns the client's one session from `open` until `close`
pub struct ConnectionManager<S = DatabaseConnection> {
    session: Option<S>,
}

impl ConnectionManager<DatabaseConnection> {
    /// Establish the session. On failure there is no manager to use.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        tracing::debug!(host = %config.host, port = config.port, database = %config.database, "Connecting");

        match DatabaseConnection::connect(config).await {
            Ok(conn) => {
                tracing::info!(database = %config.database, "Connection successful");
                Ok(Self::from_session(conn))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start connection");
                Err(e)
            }
        }
    }
}

impl<S: Session> ConnectionManager<S> {
    /// Wrap an already established session
    pub fn from_session(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// The live session, or `NotConnected` once closed
    pub fn session(&mut self) -> Result<&mut S> {
        self.session.as_mut().ok_or(Error::NotConnected)
    }

    /// Release the session. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let backend = session.backend_name();

        match session.close().await {
            Ok(()) => {
                tracing::info!(backend, "Connection closed successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(backend, error = %e, "Connection closed unsuccessfully");
                Err(Error::CloseError(e.to_string()))
            }
        }
    }
}
