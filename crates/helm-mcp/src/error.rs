//! Error types for the MCP server

use thiserror::Error;

use crate::protocol::{INTERNAL_ERROR, INVALID_PARAMS, PARSE_ERROR};

/// Result type alias for MCP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during MCP server operations
///
/// [`Error::InvalidParams`] and [`Error::UnknownTool`] reject the call itself
/// and become JSON-RPC errors. [`Error::Domain`] is a legitimate outcome of a
/// well-formed call and is returned as a tool result flagged `isError`.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing, blank or mistyped tool arguments
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Unknown tool requested
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The repository or chart could not satisfy the request
    #[error(transparent)]
    Domain(#[from] helm_repo::Error),

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid server configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// JSON-RPC error code for errors that surface at the protocol level.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Error::InvalidParams(_) | Error::UnknownTool(_) => INVALID_PARAMS,
            Error::Json(_) => PARSE_ERROR,
            Error::Domain(_) | Error::Io(_) | Error::Config(_) => INTERNAL_ERROR,
        }
    }

    /// Whether the call itself was malformed.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::InvalidParams(_) | Error::UnknownTool(_))
    }
}

impl From<helm_chart::Error> for Error {
    fn from(err: helm_chart::Error) -> Self {
        Error::Domain(err.into())
    }
}
