//! Error type of the command line tool.
//!
//! Library code raises [`InstrumentError`](crate::instrument::InstrumentError)
//! for a single file; everything that touches a crate on disk reports
//! [`Mock4rsError`], which adds a category code and path context.
//!
//! # Error Codes
//!
//! - E00x: reading, copying or removing files
//! - E01x: source files mock4rs cannot transform
//! - E02x: `.mock4rs.toml` and `Cargo.toml` problems
//! - E04x: the test command

use crate::instrument::InstrumentError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Stable code printed in front of every error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(&'static str);

impl ErrorCode {
    /// Missing file or directory
    pub const IO_FILE_NOT_FOUND: ErrorCode = ErrorCode("E001");
    /// Permission denied
    pub const IO_PERMISSION_DENIED: ErrorCode = ErrorCode("E002");
    /// Any other I/O failure
    pub const IO_GENERIC: ErrorCode = ErrorCode("E009");

    /// Source file does not parse
    pub const PARSE_SYNTAX: ErrorCode = ErrorCode("E010");
    /// Source file is the output of an earlier run
    pub const PARSE_ALREADY_INSTRUMENTED: ErrorCode = ErrorCode("E011");
    /// Trait that cannot be mocked
    pub const UNSUPPORTED_CONSTRUCT: ErrorCode = ErrorCode("E015");

    /// Invalid configuration value
    pub const CONFIG_INVALID: ErrorCode = ErrorCode("E020");
    /// Explicit configuration file missing
    pub const CONFIG_FILE_NOT_FOUND: ErrorCode = ErrorCode("E022");
    /// Manifest unreadable or not a package
    pub const CONFIG_MANIFEST: ErrorCode = ErrorCode("E023");

    /// Test command not on `PATH`
    pub const COMMAND_NOT_FOUND: ErrorCode = ErrorCode("E040");
    /// Test command could not be spawned
    pub const COMMAND_FAILED: ErrorCode = ErrorCode("E041");

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

fn describe_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" (path: {})", p.display()))
        .unwrap_or_default()
}

/// Errors of the staging and test-running pipeline.
#[derive(Debug, Clone, Error)]
pub enum Mock4rsError {
    #[error("[{code}] I/O error: {message}{}", describe_path(.path))]
    Io {
        code: ErrorCode,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    #[error("[{code}] Parse error in {}: {message} at line {line}, column {column}", .path.display())]
    Parse {
        code: ErrorCode,
        message: String,
        path: PathBuf,
        line: usize,
        column: usize,
    },

    #[error("[{code}] Cannot instrument {}: {message}", .path.display())]
    Instrument {
        code: ErrorCode,
        message: String,
        path: PathBuf,
    },

    #[error("[{code}] Configuration error: {message}{}", describe_path(.path))]
    Config {
        code: ErrorCode,
        message: String,
        path: Option<PathBuf>,
    },

    #[error("[{code}] Command error: {message}")]
    Command {
        code: ErrorCode,
        message: String,
        command: String,
    },
}

impl Mock4rsError {
    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::IO_FILE_NOT_FOUND,
            std::io::ErrorKind::PermissionDenied => ErrorCode::IO_PERMISSION_DENIED,
            _ => ErrorCode::IO_GENERIC,
        };
        Self::Io {
            code,
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(Arc::new(err)),
        }
    }

    #[must_use]
    pub fn io(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Io {
            code: ErrorCode::IO_GENERIC,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Attach the file path to a transformer error.
    #[must_use]
    pub fn instrument(err: InstrumentError, path: &Path) -> Self {
        match err {
            InstrumentError::Parse {
                message,
                line,
                column,
            } => Self::Parse {
                code: ErrorCode::PARSE_SYNTAX,
                message,
                path: path.to_path_buf(),
                line,
                column,
            },
            err @ InstrumentError::UnsupportedConstruct { .. } => Self::Instrument {
                code: ErrorCode::UNSUPPORTED_CONSTRUCT,
                message: err.to_string(),
                path: path.to_path_buf(),
            },
            err @ InstrumentError::AlreadyInstrumented => Self::Instrument {
                code: ErrorCode::PARSE_ALREADY_INSTRUMENTED,
                message: err.to_string(),
                path: path.to_path_buf(),
            },
            InstrumentError::Io { path, source } => Self::from_io_error(source, path),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::CONFIG_INVALID,
            message: message.into(),
            path: None,
        }
    }

    #[must_use]
    pub fn config_with_path(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Config {
            code: ErrorCode::CONFIG_INVALID,
            message: message.into(),
            path: Some(path.into()),
        }
    }

    #[must_use]
    pub fn manifest(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Config {
            code: ErrorCode::CONFIG_MANIFEST,
            message: message.into(),
            path: Some(path.into()),
        }
    }

    #[must_use]
    pub fn command_not_found(command: impl Into<String>) -> Self {
        let command = command.into();
        Self::Command {
            code: ErrorCode::COMMAND_NOT_FOUND,
            message: format!("executable `{command}` not found in PATH"),
            command,
        }
    }

    #[must_use]
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            code: ErrorCode::COMMAND_FAILED,
            message: message.into(),
            command: command.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io { code, .. }
            | Self::Parse { code, .. }
            | Self::Instrument { code, .. }
            | Self::Config { code, .. }
            | Self::Command { code, .. } => *code,
        }
    }

    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io { .. } => "I/O",
            Self::Parse { .. } => "Parse",
            Self::Instrument { .. } => "Instrument",
            Self::Config { .. } => "Config",
            Self::Command { .. } => "Command",
        }
    }

    /// Whether editing the crate or the configuration can fix the error.
    #[must_use]
    pub fn is_user_fixable(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Instrument { .. } | Self::Config { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Mock4rsError>;
