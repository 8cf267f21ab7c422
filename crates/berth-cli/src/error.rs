//! CLI error types with exit code handling

use berth_core::CoreError;
use berth_kube::{ConnectionError, ReconcileError};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid arguments or deployment file contents
    #[error("Invalid input: {message}")]
    #[diagnostic(code(berth::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Chart missing or unreadable
    #[error("Chart error: {message}")]
    #[diagnostic(code(berth::cli::chart))]
    Chart { message: String },

    /// Credential lookup or cluster session failure
    #[error("Connection error: {message}")]
    #[diagnostic(code(berth::cli::connection))]
    Connection {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Install or update failed
    #[error("Release error: {message}")]
    #[diagnostic(code(berth::cli::release))]
    Release { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(berth::cli::io))]
    Io { message: String },

    /// Failure already shown to the user by the status sink
    #[error("{message}")]
    #[diagnostic(code(berth::cli::reported))]
    Reported { message: String, code: i32 },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(berth::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::USAGE_ERROR,
            CliError::Chart { .. } => exit_codes::CHART_ERROR,
            CliError::Connection { .. } => exit_codes::CONNECTION_ERROR,
            CliError::Release { .. } => exit_codes::RELEASE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Reported { code, .. } => *code,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Keep the exit code but mark the error as already printed
    pub fn reported(self) -> Self {
        Self::Reported {
            code: self.exit_code(),
            message: self.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

const CREDENTIALS_HELP: &str = "run `berth credentials list` to see the stored credential ids";

impl From<ReconcileError> for CliError {
    fn from(err: ReconcileError) -> Self {
        let message = err.to_string();
        match err {
            ReconcileError::Chart(_) => CliError::Chart { message },
            ReconcileError::CredentialNotFound { .. } => CliError::Connection {
                message,
                help: Some(CREDENTIALS_HELP.to_string()),
            },
            ReconcileError::Connection(detail) => CliError::Connection {
                message: detail,
                help: None,
            },
            ReconcileError::Install { .. } | ReconcileError::Update { .. } => {
                CliError::Release { message }
            }
        }
    }
}

impl From<ConnectionError> for CliError {
    fn from(err: ConnectionError) -> Self {
        ReconcileError::from(err).into()
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Chart(err) => CliError::Chart {
                message: err.to_string(),
            },
            CoreError::Io(err) => err.into(),
            other => CliError::input(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::ChartError;

    #[test]
    fn test_reconcile_errors_map_to_exit_codes() {
        let chart: CliError = ReconcileError::Chart(ChartError::NotFound {
            path: "/ws/app".to_string(),
        })
        .into();
        assert_eq!(chart.exit_code(), exit_codes::CHART_ERROR);

        let credential: CliError = ReconcileError::CredentialNotFound {
            id: "prod".to_string(),
        }
        .into();
        assert_eq!(credential.exit_code(), exit_codes::CONNECTION_ERROR);
        assert!(matches!(credential, CliError::Connection { help: Some(_), .. }));

        let install: CliError = ReconcileError::Install {
            name: "demo".to_string(),
            message: "quota exceeded".to_string(),
        }
        .into();
        assert_eq!(install.exit_code(), exit_codes::RELEASE_ERROR);
        assert!(install.to_string().contains("quota exceeded"));

        let reported = install.reported();
        assert_eq!(reported.exit_code(), exit_codes::RELEASE_ERROR);
    }

    #[test]
    fn test_connection_error_has_one_prefix() {
        let err: CliError = ConnectionError::Store("cannot parse credentials.yaml".to_string()).into();

        assert_eq!(err.exit_code(), exit_codes::CONNECTION_ERROR);
        assert_eq!(
            err.to_string(),
            "Connection error: credential store error: cannot parse credentials.yaml"
        );
    }

    #[test]
    fn test_invalid_context_is_input_error() {
        let err: CliError = CoreError::InvalidContext {
            message: "release name 'Demo' is not a DNS label".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::USAGE_ERROR);
    }
}
