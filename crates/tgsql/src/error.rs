//! Error types for tgsql

use thiserror::Error;

/// Result type alias for tgsql operations
pub type DbResult<T> = Result<T, DbError>;

/// Error types for database operations
#[derive(Debug, Error)]
pub enum DbError {
    /// Data source could not be opened, reached or configured
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error (exhausted, timed out, closed)
    #[error("Pool error: {0}")]
    Pool(String),

    /// Mutating statement refused because it has no WHERE predicate
    #[error("Guard violation: {0}")]
    Guard(String),

    /// Row could not be decoded into the requested shape
    #[error("Shape error on column '{column}': {message}")]
    Shape { column: String, message: String },

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Builder state rejected before execution
    #[error("Validation error: {0}")]
    Validation(String),

    /// Commit/rollback misuse or failure
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Configuration could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),
}

/// Coarse classification used to decide where an error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Infrastructure failure; escalate to the outer boundary.
    Connection,
    /// Write guard refused the statement; handle locally.
    Guard,
    /// Caller asked for a row shape the result does not have.
    Shape,
    /// Ordinary data-level failure; handle locally.
    Data,
}

/// Numeric error codes carried by [`Exception`].
pub struct ErrorCode;

impl ErrorCode {
    pub const VALIDATE: u32 = 10001;
    pub const EXCEPTION: u32 = 20001;
    pub const DATABASE: u32 = 30001;
}

/// Structured payload handed to the request-level recovery boundary.
#[derive(Debug)]
pub struct Exception {
    pub status_code: u16,
    pub error_code: u32,
    pub message: String,
    pub cause: Option<DbError>,
}

impl std::fmt::Display for Exception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} / {}] {}", self.status_code, self.error_code, self.message)
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl DbError {
    /// Create a shape error for a specific column
    pub fn shape(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Shape {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a guard violation
    pub fn guard(message: impl Into<String>) -> Self {
        Self::Guard(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::Pool(_) | Self::Config(_) => ErrorKind::Connection,
            Self::Guard(_) => ErrorKind::Guard,
            Self::Shape { .. } => ErrorKind::Shape,
            Self::Query(e) if e.is_closed() => ErrorKind::Connection,
            _ => ErrorKind::Data,
        }
    }

    /// Whether the error must unwind to the outer recovery boundary rather than
    /// be handled by the immediate caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::Shape)
    }

    /// Check if this is a guard violation
    pub fn is_guard(&self) -> bool {
        matches!(self, Self::Guard(_))
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Convert into the payload rendered by the outer boundary.
    pub fn exception(self) -> Exception {
        let (status_code, error_code, message) = match self.kind() {
            ErrorKind::Data if matches!(self, Self::Validation(_)) => {
                (400, ErrorCode::VALIDATE, "statement rejected before execution")
            }
            ErrorKind::Connection => (500, ErrorCode::DATABASE, "database connection failure"),
            ErrorKind::Shape => (500, ErrorCode::DATABASE, "result does not match target shape"),
            ErrorKind::Guard => (400, ErrorCode::VALIDATE, "statement refused without WHERE"),
            ErrorKind::Data => (500, ErrorCode::EXCEPTION, "database statement failed"),
        };
        Exception {
            status_code,
            error_code,
            message: message.to_string(),
            cause: Some(self),
        }
    }

    /// Parse a tokio_postgres error into a more specific DbError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_errors_stay_local() {
        let err = DbError::guard("no WHERE");
        assert_eq!(err.kind(), ErrorKind::Guard);
        assert!(!err.is_fatal());
        assert!(err.is_guard());
    }

    #[test]
    fn connection_and_shape_errors_escalate() {
        assert!(DbError::Connection("refused".into()).is_fatal());
        assert!(DbError::Pool("timeout".into()).is_fatal());
        assert!(DbError::shape("age", "expected int8").is_fatal());
        assert!(!DbError::not_found("user").is_fatal());
        assert!(!DbError::UniqueViolation("users_email_key".into()).is_fatal());
    }

    #[test]
    fn exception_payload_keeps_cause() {
        let ex = DbError::Connection("refused".into()).exception();
        assert_eq!(ex.status_code, 500);
        assert_eq!(ex.error_code, ErrorCode::DATABASE);
        assert!(matches!(ex.cause, Some(DbError::Connection(_))));
        assert!(std::error::Error::source(&ex).is_some());

        let ex = DbError::guard("no WHERE").exception();
        assert_eq!(ex.status_code, 400);
        assert_eq!(ex.error_code, ErrorCode::VALIDATE);
    }
}
