//! Error types for sql_command

use thiserror::Error;

/// Result type for sql_command operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sql_command
///
/// Every variant names the phase it came from, so a caller can print the
/// error as-is and still tell a connect failure from a bad command file.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connect error: {0}")]
    ConnectError(String),

    #[error("Failed to load command file '{path}': {message}")]
    CommandLoadError { path: String, message: String },

    #[error("Command execution failed: {0}")]
    CommandExecutionError(String),

    #[error("Close error: {0}")]
    CloseError(String),

    #[error("Parameter parse error: {0}")]
    ParameterParseError(String),

    #[error("Not connected: the connection has been closed")]
    NotConnected,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Short name of the phase that failed
    pub fn phase(&self) -> &'static str {
        match self {
            Error::ConfigError(_) => "config",
            Error::ConnectError(_) => "connect",
            Error::CommandLoadError { .. } => "load",
            Error::CommandExecutionError(_) => "execute",
            Error::CloseError(_) => "close",
            Error::ParameterParseError(_) => "parameters",
            Error::NotConnected => "connect",
            Error::IoError(_) => "io",
            Error::SqlxError(_) => "database",
            Error::Unknown(_) => "unknown",
        }
    }

    /// Whether the client must stop issuing commands after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConnectError(_) | Error::NotConnected | Error::ConfigError(_)
        )
    }
}

/// Convert TOML deserialization errors to sql_command errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::ConnectError("refused".into()), "connect", true)]
    #[case(Error::CommandLoadError { path: "a.sql".into(), message: "missing".into() }, "load", false)]
    #[case(Error::CommandExecutionError("syntax".into()), "execute", false)]
    #[case(Error::CloseError("broken pipe".into()), "close", false)]
    #[case(Error::ParameterParseError("bad".into()), "parameters", false)]
    #[case(Error::NotConnected, "connect", true)]
    fn test_phase_and_fatality(#[case] error: Error, #[case] phase: &str, #[case] fatal: bool) {
        assert_eq!(error.phase(), phase);
        assert_eq!(error.is_fatal(), fatal);
    }

    #[test]
    fn test_load_error_message_names_file() {
        let error = Error::CommandLoadError {
            path: "sql/add_user.sql".into(),
            message: "No such file or directory".into(),
        };
        let message = error.to_string();
        assert!(message.contains("sql/add_user.sql"));
        assert!(message.contains("No such file or directory"));
    }
}
