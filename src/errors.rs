use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field-level detail attached to a provider error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: Option<String>,
    pub message: String,
}

/// Input validation error returned before any collaborator is called.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{}: {}", field, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Structured error envelope returned by a completion provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct APIError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldError>,
    /// Raw response body for debugging (when available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
}

impl APIError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
            request_id: None,
            fields: Vec::new(),
            raw_body: None,
        }
    }
}

impl fmt::Display for APIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "{} ({}): {}", code, self.status, self.message)
        } else {
            write!(f, "{}: {}", self.status, self.message)
        }
    }
}

impl std::error::Error for APIError {}

/// Transport-level error (timeouts, DNS/TLS/connectivity).
#[cfg(feature = "client")]
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
}

/// Broad transport error kinds for classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Other => "transport",
        };
        write!(f, "{label}")
    }
}

// ============================================================================
// Collaborator errors
// ============================================================================

/// Failure of the completion collaborator. Never retried by the orchestrator.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("{0}")]
    Api(#[from] APIError),

    #[cfg(feature = "client")]
    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("failed to decode completion response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("completion response contained no assistant reply")]
    EmptyReply,

    #[error("{0}")]
    Other(String),
}

impl From<String> for CompletionError {
    fn from(message: String) -> Self {
        CompletionError::Other(message)
    }
}

impl From<&str> for CompletionError {
    fn from(message: &str) -> Self {
        CompletionError::Other(message.to_string())
    }
}

/// Failure of the schema-description collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("schema lookup failed: {0}")]
    Lookup(String),
}

// ============================================================================
// Attempt-level (recoverable) errors
// ============================================================================

/// The guard classified the query as mutating. The query was never executed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Only read-only queries are allowed (found {keyword}).")]
pub struct NotReadOnlyError {
    /// The denylisted statement keyword that matched, upper-cased.
    pub keyword: String,
}

/// The database rejected or failed the query.
///
/// `message` is the driver's text verbatim; it is fed back to the model as
/// correction feedback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The assistant reply contained no extractable SQL block.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no SQL found")]
pub struct NoSqlFound;

/// Failure returned by [`crate::QueryExecutor::execute`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecuteError {
    #[error("{0}")]
    NotReadOnly(#[from] NotReadOnlyError),

    #[error("{0}")]
    Execution(#[from] ExecutionError),
}

/// Any failure the retry loop turns into a correction turn.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error("{0}")]
    NoSql(#[from] NoSqlFound),

    #[error("{0}")]
    NotReadOnly(#[from] NotReadOnlyError),

    #[error("{0}")]
    Execution(#[from] ExecutionError),
}

impl AttemptFailure {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptFailure::NoSql(_) => "no_sql",
            AttemptFailure::NotReadOnly(_) => "not_read_only",
            AttemptFailure::Execution(_) => "execution",
        }
    }

    /// Human-readable description placed into the correction turn.
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl From<ExecuteError> for AttemptFailure {
    fn from(err: ExecuteError) -> Self {
        match err {
            ExecuteError::NotReadOnly(e) => AttemptFailure::NotReadOnly(e),
            ExecuteError::Execution(e) => AttemptFailure::Execution(e),
        }
    }
}

// ============================================================================
// Crate-level error
// ============================================================================

/// Convenience alias for fallible crate results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type surfaced by the crate.
///
/// Exhausting the attempt budget is not represented here; see
/// [`crate::TextToSqlOutcome::Exhausted`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("{0}")]
    Schema(#[from] SchemaError),

    /// Failed to open a database pool.
    #[cfg(any(feature = "postgres", feature = "sqlite"))]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
