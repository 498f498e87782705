//! Recording session used by unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::db::session::Session;
use crate::db::statement::PreparedStatement;
use crate::value::CommandResult;

/// Everything a `MockSession` was asked to do
#[derive(Debug, Default)]
pub struct MockLog {
    pub executed: Vec<Vec<PreparedStatement>>,
    pub rollbacks: usize,
    pub closes: usize,
}

/// A session that records calls and replays scripted outcomes.
///
/// Each `execute` pops the next scripted outcome; once the script is empty
/// every call succeeds with `NoRows`.
pub struct MockSession {
    log: Arc<Mutex<MockLog>>,
    script: VecDeque<Result<CommandResult, String>>,
    fail_close: bool,
    fail_rollback: bool,
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(MockLog::default())),
            script: VecDeque::new(),
            fail_close: false,
            fail_rollback: false,
        }
    }

    pub fn log(&self) -> Arc<Mutex<MockLog>> {
        Arc::clone(&self.log)
    }

    pub fn then_ok(mut self, result: CommandResult) -> Self {
        self.script.push_back(Ok(result));
        self
    }

    pub fn then_fail(mut self, message: &str) -> Self {
        self.script.push_back(Err(message.to_string()));
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }
}

#[async_trait]
impl Session for MockSession {
    async fn execute(&mut self, batch: &[PreparedStatement]) -> Result<CommandResult, sqlx::Error> {
        self.log.lock().unwrap().executed.push(batch.to_vec());
        match self.script.pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(sqlx::Error::Protocol(message)),
            None => Ok(CommandResult::NoRows { rows_affected: 0 }),
        }
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.log.lock().unwrap().rollbacks += 1;
        if self.fail_rollback {
            return Err(sqlx::Error::Protocol("connection reset".into()));
        }
        Ok(())
    }

    async fn close(self) -> Result<(), sqlx::Error> {
        self.log.lock().unwrap().closes += 1;
        if self.fail_close {
            return Err(sqlx::Error::Protocol("socket already closed".into()));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Mock"
    }
}
