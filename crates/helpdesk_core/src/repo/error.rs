//! Error taxonomy shared by the ordered-lane store and the audit ledger.

use crate::db::DbError;
use crate::model::fields::FieldError;
use crate::model::EntityKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by store and ledger operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from store and ledger operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Referenced item or parent does not exist.
    NotFound { entity: EntityKind, id: String },
    /// Request rejected before any write.
    InvalidArgument(String),
    /// Write lock still contended after the single retry.
    Conflict { operation: &'static str },
    /// Persisted data cannot be converted to a valid read model, or a
    /// partition lost its dense ordering.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl StoreError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the failure is transient lock contention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Db(err) => err.is_lock_contention(),
            _ => false,
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::Conflict { operation } => write!(
                f,
                "{operation} conflicted with a concurrent change; refresh and try again"
            ),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "store requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<FieldError> for StoreError {
    fn from(value: FieldError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}
