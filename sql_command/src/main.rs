use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use sql_command::value::format_row;
use sql_command::{bootstrap, config, script, utils, CommandResult, PostgresClient};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; the DB_* environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one SQL command file
    Run {
        /// Path to the SQL file
        #[arg(short, long)]
        file: PathBuf,

        /// Positional parameters as a literal, e.g. "('alice', 3)"
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Run an action script of action/payload line pairs
    Script {
        /// Path to the action script
        input: PathBuf,

        /// Directory holding one <action>.sql file per action
        #[arg(long, default_value = "sql")]
        sql_dir: PathBuf,
    },

    /// Create the database, its tables and its triggers
    Setup {
        /// Directory holding the initialization scripts
        #[arg(long, default_value = "sql/initialization")]
        sql_dir: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let config_path = args.config.as_ref().map(|p| p.display().to_string());
    let config = config::load(config_path.as_deref())?;
    utils::init_logging(config.logging.as_ref())?;

    match args.command {
        Command::Setup { sql_dir } => {
            let report = bootstrap::run_setup(&config.database, &sql_dir).await;
            if report.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Run { file, params } => {
            let mut client = PostgresClient::new(config).await?;
            let outcome = client.run_command(&file, params.as_deref()).await;
            // best effort; close failures are already logged
            let _ = client.close().await;

            match outcome {
                Ok(result) => {
                    print_result(&result)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(_) => Ok(ExitCode::FAILURE),
            }
        }
        Command::Script { input, sql_dir } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read action script {}", input.display()))?;
            let parsed = script::parse_script(&text);

            let mut client = PostgresClient::new(config).await?;
            let stdout = std::io::stdout();
            let summary = script::run_script(&mut client, &parsed, &sql_dir, &mut stdout.lock()).await;
            let _ = client.close().await;

            let summary = summary?;
            tracing::info!(succeeded = summary.succeeded, failed = summary.failed, "Action script finished");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_result(result: &CommandResult) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match result {
        CommandResult::Rows { rows, .. } => {
            for row in rows {
                writeln!(out, "{}", format_row(row))?;
            }
        }
        CommandResult::NoRows { rows_affected } => {
            tracing::info!(rows_affected, "Command returned no rows");
        }
    }
    Ok(())
}
