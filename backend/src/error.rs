//! Error types for the xmlgate service.
//!
//! One enum per concern, all folded into [`ServerError`] at the HTTP edge:
//!
//! - [`ConfigError`] - environment / configuration errors
//! - [`PathError`] - client path rewriting and output naming
//! - [`ToolError`] - external process failures
//! - [`ConvertError`] - XML <-> JSON conversion
//! - [`GateError`] - free usage / API key gating
//! - [`VersionError`] - version.json bookkeeping
//! - [`ServerError`] - top-level request errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable is set but cannot be parsed.
    #[error("Invalid value for {var}: {value}")]
    InvalidVar { var: String, value: String },
}

// =============================================================================
// Path Errors
// =============================================================================

/// Errors while rewriting a client path or resolving an output target.
#[derive(Debug, Error)]
pub enum PathError {
    /// No path given.
    #[error("Path is empty")]
    Empty,

    /// Path contains characters that cannot appear in a file name.
    #[error("Invalid path: {0}")]
    Invalid(String),

    /// Path tries to climb out of the data root.
    #[error("Path traversal is not allowed: {0}")]
    Traversal(String),

    /// Absolute path outside both the client prefix and the data root.
    #[error("Path is outside the data root: {0}")]
    OutsideRoot(String),

    /// File has the wrong extension for the operation.
    #[error("Unsupported file type for {path}: expected {expected}")]
    Extension { path: String, expected: String },

    /// Output name rejected by the name pattern.
    #[error("Invalid output name: {0}")]
    InvalidName(String),
}

// =============================================================================
// Tool Errors
// =============================================================================

/// Errors from spawning or running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The binary could not be found.
    #[error("{0} is not installed or not on PATH")]
    NotInstalled(String),

    /// Any other spawn failure.
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran longer than the configured timeout.
    #[error("Tool timed out after {0} seconds")]
    Timeout(u64),

    /// The tool exited unsuccessfully.
    #[error("{tool} failed ({}): {stderr}", .code.map_or("signal".to_string(), |c| format!("exit {}", c)))]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The tool exited successfully but reported on stderr.
    #[error("{0}")]
    Stderr(String),
}

// =============================================================================
// Conversion Errors
// =============================================================================

/// Errors while converting between XML and JSON.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Malformed XML input.
    #[error("XML error: {0}")]
    Xml(String),

    /// Malformed JSON input.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document has no root element.
    #[error("Document has no root element")]
    NoRoot,

    /// A JSON key that cannot be used as an XML name.
    #[error("Invalid XML name: {0}")]
    InvalidName(String),
}

// =============================================================================
// Gate Errors
// =============================================================================

/// Errors from the usage gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// An API key was presented but is not known.
    #[error("Invalid API key")]
    InvalidKey,

    /// Free requests used up and no key presented.
    #[error("Free usage limit of {limit} requests reached; supply an API key via x-api-key")]
    FreeUsageExhausted { limit: u32 },
}

// =============================================================================
// Version Errors
// =============================================================================

/// Errors while bumping version.json.
#[derive(Debug, Error)]
pub enum VersionError {
    /// Version string is not `major.minor.patch`.
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),

    /// IO error.
    #[error("Version file IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Version file JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Server Errors (top-level)
// =============================================================================

/// HTTP request errors.
///
/// Every handler returns this; [`ServerError::status`] picks the HTTP code.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Path error.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Tool error.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Conversion error.
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Gate error.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// Invalid request.
    #[error("{0}")]
    BadRequest(String),

    /// Input file does not exist.
    #[error("File not found: {0}")]
    NotFound(String),

    /// Result could not be used even though the tool succeeded.
    #[error("{0}")]
    Unprocessable(String),

    /// IO error while reading inputs or writing outputs.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Path(_) | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Convert(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Gate(GateError::InvalidKey) => StatusCode::UNAUTHORIZED,
            ServerError::Gate(GateError::FreeUsageExhausted { .. }) => StatusCode::PAYMENT_REQUIRED,
            ServerError::Tool(ToolError::NotInstalled(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Tool(ToolError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Tool(_) | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), Json(error_response(&self.to_string()))).into_response()
    }
}

/// Body shared by every error response
pub fn error_response(error: &str) -> Value {
    json!({ "error": error })
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for path operations.
pub type PathResult<T> = Result<T, PathError>;

/// Result type for tool invocations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Result type for conversions.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Result type for HTTP handlers.
pub type ServerResult<T> = Result<T, ServerError>;
