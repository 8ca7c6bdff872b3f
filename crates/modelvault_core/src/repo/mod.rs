//! Repository layer for the model registry and the model payload store.
//!
//! # Responsibility
//! - Define storage contracts used by the sync engine.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Registry and payloads live in separate tables; listing models never
//!   loads payloads.
//! - A rejected payload write leaves the last committed payload intact.

pub mod registry_repo;
pub mod store_repo;

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::metadata::ModelId;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for registry and payload store operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(ModelId),
    /// Persisted row cannot be converted to a valid domain value.
    InvalidData(String),
    /// Payload could not be encoded for storage.
    Encode(serde_json::Error),
    /// Payload is larger than the configured store quota.
    QuotaExceeded {
        model_id: ModelId,
        byte_len: u64,
        limit: u64,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl RepoError {
    /// Whether this error is a rejected write rather than a read problem.
    pub fn is_write_rejection(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. } | Self::Db(_) | Self::Encode(_))
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "model not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted model data: {message}"),
            Self::Encode(err) => write!(f, "cannot encode model payload: {err}"),
            Self::QuotaExceeded {
                model_id,
                byte_len,
                limit,
            } => write!(
                f,
                "payload for model {model_id} is {byte_len} bytes, exceeding the store quota of {limit} bytes"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection is not migrated: expected schema version {expected_version}, found {actual_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
