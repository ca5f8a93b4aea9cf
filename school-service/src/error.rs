//! Error types and HTTP response conversion

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Structured Database Errors
// ============================================================================

/// Database operation being performed when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseOperation {
    /// Establishing a database connection
    Connect,
    /// Executing a query
    Query,
    /// Inserting records
    Insert,
    /// Updating records
    Update,
    /// Deleting records
    Delete,
    /// Transaction operations (begin, commit, rollback)
    Transaction,
    /// Creating the schema
    Migration,
}

impl fmt::Display for DatabaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Query => write!(f, "query"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Transaction => write!(f, "transaction"),
            Self::Migration => write!(f, "migration"),
        }
    }
}

/// Category of database error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseErrorKind {
    /// Failed to establish connection
    ConnectionFailed,
    /// Constraint violation (unique, foreign key, check)
    ConstraintViolation,
    /// Query execution failed
    QueryFailed,
    /// Transaction failed (begin, commit, or rollback)
    TransactionFailed,
    /// Type conversion error
    TypeConversion,
    /// Configuration error
    Configuration,
    /// Connection pool exhausted
    PoolExhausted,
    /// Other/unknown error
    Other,
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::QueryFailed => write!(f, "query_failed"),
            Self::TransactionFailed => write!(f, "transaction_failed"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Configuration => write!(f, "configuration"),
            Self::PoolExhausted => write!(f, "pool_exhausted"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured database error with operation context
///
/// The message carries driver detail and is only ever logged server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    /// The operation being performed when the error occurred
    pub operation: DatabaseOperation,
    /// The category of error
    pub kind: DatabaseErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl DatabaseError {
    /// Create a new database error
    pub fn new(
        operation: DatabaseOperation,
        kind: DatabaseErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    /// Create a transaction failed error
    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::new(
            DatabaseOperation::Transaction,
            DatabaseErrorKind::TransactionFailed,
            message,
        )
    }

    /// Re-tag the error with the operation that was actually running
    pub fn during(mut self, operation: DatabaseOperation) -> Self {
        self.operation = operation;
        self
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Database {} error during {}: {}",
            self.kind, self.operation, self.message
        )
    }
}

impl std::error::Error for DatabaseError {}

/// Result type alias using the service error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the service
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Structured database error with operation context
    #[error("{0}")]
    Database(DatabaseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed identifier, malformed body or disallowed parameter
    #[error("Validation error: {0}")]
    Validation(String),

    /// No record for the given identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Patch value incompatible with the field's declared kind
    #[error("Type mismatch for field '{field}': cannot use {value}")]
    TypeMismatch {
        /// External name of the offending field
        field: String,
        /// The rejected value, rendered as JSON
        value: String,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded {
        /// Seconds until the caller's window resets
        retry_after_secs: u64,
    },

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a not-found error about a teacher id
    pub fn teacher_not_found(id: i64) -> Self {
        Error::NotFound(format!("teacher {} not found", id))
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            status: status.as_u16(),
        }
    }

    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let mut retry_after = None;

        let (status, error_response) = match self {
            Error::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CONFIG_ERROR",
                        "Service misconfigured",
                    ),
                )
            }

            Error::Database(ref e) => {
                tracing::error!(
                    operation = %e.operation,
                    kind = %e.kind,
                    "Database error: {}", e.message
                );

                let status = StatusCode::INTERNAL_SERVER_ERROR;
                let code = format!("DATABASE_{}", e.kind.to_string().to_uppercase());

                // Never expose query text or driver detail to the caller
                (
                    status,
                    ErrorResponse::with_code(status, code, "Database operation failed"),
                )
            }

            Error::Io(e) => {
                tracing::error!("I/O error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "IO_ERROR",
                        "I/O operation failed",
                    ),
                )
            }

            Error::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_code(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ),

            Error::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::with_code(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ),

            e @ Error::TypeMismatch { .. } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_code(StatusCode::BAD_REQUEST, "TYPE_MISMATCH", e.to_string()),
            ),

            Error::RateLimitExceeded { retry_after_secs } => {
                retry_after = Some(retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorResponse::with_code(
                        StatusCode::TOO_MANY_REQUESTS,
                        "RATE_LIMIT_EXCEEDED",
                        "Too many requests",
                    ),
                )
            }

            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "Internal server error",
                    ),
                )
            }
        };

        let mut response = (status, Json(error_response)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<DatabaseError> for Error {
    fn from(err: DatabaseError) -> Self {
        Error::Database(err)
    }
}

impl From<crate::fields::RegistryError> for Error {
    fn from(err: crate::fields::RegistryError) -> Self {
        Error::Internal(format!("field registry: {}", err))
    }
}

// Conversion from sqlx::Error to DatabaseError
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;
        match err {
            E::PoolTimedOut => Self::new(
                DatabaseOperation::Connect,
                DatabaseErrorKind::PoolExhausted,
                "Connection pool timed out",
            ),
            E::PoolClosed => Self::new(
                DatabaseOperation::Connect,
                DatabaseErrorKind::ConnectionFailed,
                "Connection pool is closed",
            ),
            E::Configuration(e) => Self::new(
                DatabaseOperation::Connect,
                DatabaseErrorKind::Configuration,
                e.to_string(),
            ),
            E::Io(e) => Self::new(
                DatabaseOperation::Connect,
                DatabaseErrorKind::ConnectionFailed,
                e.to_string(),
            ),
            E::ColumnDecode { index, source } => Self::new(
                DatabaseOperation::Query,
                DatabaseErrorKind::TypeConversion,
                format!("Failed to decode column {}: {}", index, source),
            ),
            E::Decode(e) => Self::new(
                DatabaseOperation::Query,
                DatabaseErrorKind::TypeConversion,
                e.to_string(),
            ),
            E::Database(db_err) => {
                let kind = if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
                {
                    DatabaseErrorKind::ConstraintViolation
                } else {
                    DatabaseErrorKind::QueryFailed
                };
                Self::new(DatabaseOperation::Query, kind, db_err.to_string())
            }
            other => Self::new(
                DatabaseOperation::Query,
                DatabaseErrorKind::Other,
                other.to_string(),
            ),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(err.into())
    }
}
