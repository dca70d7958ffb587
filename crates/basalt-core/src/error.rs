/// Core error types for the Basalt material system.
use std::path::PathBuf;

/// A specialized Result type for Basalt operations.
pub type BasaltResult<T> = Result<T, BasaltError>;

/// Top-level error type encompassing all Basalt subsystems.
#[derive(Debug, thiserror::Error)]
pub enum BasaltError {
    #[error("parse error: {message} at line {line}")]
    Parse { message: String, line: usize },

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("definition is read-only: {0}")]
    ReadOnly(String),

    #[error("save error: {message} ({path:?})")]
    Save { message: String, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl BasaltError {
    /// Create a parse error with a source line.
    pub fn parse(message: impl Into<String>, line: usize) -> Self {
        BasaltError::Parse {
            message: message.into(),
            line,
        }
    }

    /// Create a save error with the offending path.
    pub fn save(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        BasaltError::Save {
            message: message.into(),
            path: path.into(),
        }
    }
}
