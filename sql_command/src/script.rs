//! Action script runner
//!
//! An action script is a text file of non-blank line pairs:
//!
//! ```text
//! add_user
//! ("alice",)
//! get_leaderboard
//! (3,)
//! ```
//!
//! The first line names the action, which maps to `<sql_dir>/<action>.sql`;
//! the second is the literal payload for that command.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::db::Session;
use crate::error::{Error, Result};
use crate::value::{format_row, CommandResult};
use crate::PostgresClient;

/// One action parsed from a script
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptAction {
    /// 1-based line number of the action line
    pub line: usize,
    pub action: String,
    pub payload: String,
}

/// Parsed script plus the line number of a trailing unpaired line, if any
#[derive(Debug, Default, PartialEq)]
pub struct Script {
    pub actions: Vec<ScriptAction>,
    pub dangling_line: Option<usize>,
}

/// Counts of what happened while running a script
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Split script text into action/payload pairs, skipping blank lines
pub fn parse_script(text: &str) -> Script {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    let mut script = Script::default();
    for pair in lines.chunks(2) {
        match pair {
            [(line, action), (_, payload)] => script.actions.push(ScriptAction {
                line: *line,
                action: action.to_lowercase(),
                payload: payload.to_string(),
            }),
            [(line, _)] => script.dangling_line = Some(*line),
            _ => {}
        }
    }
    script
}

/// Path of the command file for `action`.
///
/// Action names are plain identifiers; anything that could walk out of
/// `sql_dir` is refused.
pub fn command_path(sql_dir: &Path, action: &str) -> Result<PathBuf> {
    let valid = !action.is_empty()
        && action
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if !valid {
        return Err(Error::CommandLoadError {
            path: action.to_string(),
            message: "action names may only contain letters, digits, '_' and '-'".to_string(),
        });
    }
    Ok(sql_dir.join(format!("{}.sql", action)))
}

/// Run every action of `script`, writing returned rows to `out`.
///
/// A failing action is logged and counted; the runner moves on to the next.
pub async fn run_script<S: Session, W: Write>(
    client: &mut PostgresClient<S>,
    script: &Script,
    sql_dir: &Path,
    out: &mut W,
) -> Result<ScriptSummary> {
    let mut summary = ScriptSummary::default();

    for entry in &script.actions {
        tracing::info!(line = entry.line, action = %entry.action, "Running action");

        let result = match command_path(sql_dir, &entry.action) {
            Ok(path) => client.run_command(&path, Some(entry.payload.as_str())).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(CommandResult::Rows { rows, .. }) => {
                for row in &rows {
                    writeln!(out, "{}", format_row(row))?;
                }
                summary.succeeded += 1;
            }
            Ok(CommandResult::NoRows { .. }) => summary.succeeded += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!(line = entry.line, action = %entry.action, phase = e.phase(), error = %e, "Action failed");
                summary.failed += 1;
            }
        }
    }

    if let Some(line) = script.dangling_line {
        tracing::warn!(line, "Ignoring action without a payload line");
    }

    Ok(summary)
}
