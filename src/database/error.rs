use crate::error::{AppError, AppErrorKind, InfrastructureError};
use std::fmt;

/// Postgres SQLSTATE codes we branch on
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    NotFound { entity: String, id: String },
    UniqueViolation { constraint: Option<String> },
    /// A CHECK constraint (e.g. `stock >= 0`) rejected the write
    CheckViolation { constraint: Option<String> },
    Connection { message: String },
    Query { message: String },
    Unknown { message: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            },
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().map(|c| c.to_string());
                match db_err.code().as_deref() {
                    Some(UNIQUE_VIOLATION) => DatabaseErrorKind::UniqueViolation { constraint },
                    Some(CHECK_VIOLATION) => DatabaseErrorKind::CheckViolation { constraint },
                    _ => DatabaseErrorKind::Query {
                        message: db_err.message().to_string(),
                    },
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseErrorKind::Connection {
                    message: err.to_string(),
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };

        Self { kind }
    }

    /// Build a row-decoding error for values stored outside the known vocabulary
    pub fn invalid_column(column: &str, value: &str) -> Self {
        Self::new(DatabaseErrorKind::Unknown {
            message: format!("unexpected value '{}' in column {}", value, column),
        })
    }

    pub fn is_unique_violation_on(&self, name: &str) -> bool {
        matches!(
            &self.kind,
            DatabaseErrorKind::UniqueViolation { constraint: Some(c) } if c == name
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DatabaseErrorKind::NotFound { entity, id } => write!(f, "{} not found: {}", entity, id),
            DatabaseErrorKind::UniqueViolation { constraint } => write!(
                f,
                "unique constraint violated: {}",
                constraint.as_deref().unwrap_or("unknown")
            ),
            DatabaseErrorKind::CheckViolation { constraint } => write!(
                f,
                "check constraint violated: {}",
                constraint.as_deref().unwrap_or("unknown")
            ),
            DatabaseErrorKind::Connection { message } => write!(f, "connection error: {}", message),
            DatabaseErrorKind::Query { message } => write!(f, "query error: {}", message),
            DatabaseErrorKind::Unknown { message } => write!(f, "database error: {}", message),
        }
    }
}

impl std::error::Error for DatabaseError {}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: err.to_string(),
            is_retryable: err.is_retryable(),
        }))
    }
}
