use crate::oracle::OracleError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    Io,
    Oracle,
    Internal,
}

#[derive(Debug)]
pub enum DesignError {
    InvalidInput(String),
    Oracle(OracleError),
    Io { path: String, message: String },
    Csv { path: String, message: String },
    PrimerNotFound { name: String, path: String },
    Config { path: String, message: String },
}

impl DesignError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) | Self::Config { .. } => ErrorCode::InvalidInput,
            Self::Oracle(_) => ErrorCode::Oracle,
            Self::Io { .. } => ErrorCode::Io,
            Self::Csv { .. } => ErrorCode::Internal,
            Self::PrimerNotFound { .. } => ErrorCode::NotFound,
        }
    }

    pub(crate) fn io(path: &str, err: impl fmt::Display) -> Self {
        Self::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn csv(path: &str, err: impl fmt::Display) -> Self {
        Self::Csv {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for DesignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "Invalid input: {message}"),
            Self::Oracle(e) => write!(f, "{e}"),
            Self::Io { path, message } => write!(f, "Could not access '{path}': {message}"),
            Self::Csv { path, message } => write!(f, "Bad CSV in '{path}': {message}"),
            Self::PrimerNotFound { name, path } => {
                write!(f, "Primer '{name}' is not listed in '{path}'")
            }
            Self::Config { path, message } => {
                write!(f, "Could not parse options file '{path}': {message}")
            }
        }
    }
}

impl Error for DesignError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Oracle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<OracleError> for DesignError {
    fn from(err: OracleError) -> Self {
        DesignError::Oracle(err)
    }
}
