//! Error types for helm-repo

/// Result type for helm-repo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced while resolving repositories and charts.
///
/// All variants describe a request that could not be satisfied rather than a
/// malformed one. They are `Clone` so a single fetch outcome can be handed to
/// every caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("repository {url:?} is unavailable: {message}")]
    RepositoryUnavailable { url: String, message: String },

    #[error("{}", chart_not_found_message(.repository, .chart, .version.as_deref()))]
    ChartNotFound {
        repository: String,
        chart: String,
        version: Option<String>,
    },

    #[error("chart {chart:?} version {version:?} is unavailable: {message}")]
    ChartUnavailable {
        chart: String,
        version: String,
        message: String,
    },

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Content(#[from] helm_chart::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

fn chart_not_found_message(repository: &str, chart: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => {
            format!("chart {chart:?} version {version:?} not found in repository {repository:?}")
        }
        None => format!("chart {chart:?} not found in repository {repository:?}"),
    }
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::RepositoryUnavailable { .. } => "repository_unavailable",
            Error::ChartNotFound { .. } => "chart_not_found",
            Error::ChartUnavailable { .. } => "chart_unavailable",
            Error::InvalidUrl { .. } => "invalid_url",
            Error::Content(e) => match e {
                helm_chart::Error::FileNotFound { .. } => "file_not_found",
                helm_chart::Error::PathNotFound { .. } | helm_chart::Error::InvalidPath { .. } => {
                    "path_not_found"
                }
                helm_chart::Error::OutputTooLarge { .. } => "output_too_large",
                helm_chart::Error::InvalidArchive { .. }
                | helm_chart::Error::InvalidMetadata { .. }
                | helm_chart::Error::Parse { .. } => "invalid_chart",
            },
            Error::Internal(_) => "internal",
        }
    }

    pub fn repository_unavailable(url: &str, message: impl ToString) -> Self {
        Self::RepositoryUnavailable {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_url(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
