//! Error types for helm-chart

/// Result type for helm-chart operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading a packaged chart.
///
/// Errors are `Clone` so that a single extraction outcome can be shared by
/// every caller waiting on the same chart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{file} not found in chart archive")]
    FileNotFound { file: String },

    #[error("path {path:?} not found in values")]
    PathNotFound { path: String },

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid chart archive: {message}")]
    InvalidArchive { message: String },

    #[error("invalid chart metadata in {file}: {message}")]
    InvalidMetadata { file: String, message: String },

    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("{file} is too large ({size} bytes, limit {limit})")]
    OutputTooLarge { file: String, size: u64, limit: u64 },
}

impl Error {
    pub fn file_not_found(file: impl Into<String>) -> Self {
        Self::FileNotFound { file: file.into() }
    }

    pub fn invalid_archive(message: impl ToString) -> Self {
        Self::InvalidArchive {
            message: message.to_string(),
        }
    }

    pub fn parse(file: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.to_string(),
        }
    }
}
