//! Model payload store contract and SQLite implementation.
//!
//! # Invariants
//! - One payload row per model id.
//! - Quota checks run before any SQL write, and the write itself is a single
//!   upsert statement, so a rejected write keeps the previous payload.
//! - Writes made inside `atomically` commit together with any registry writes
//!   on the same connection, or roll back together.

use super::{ensure_connection_ready, RepoError, RepoResult};
use crate::model::data::ModelData;
use crate::model::metadata::ModelId;
use crate::model::now_epoch_ms;
use crate::sync::content_hash::{hash_model_data, ContentHash};
use log::{error, warn};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

/// Key-value persistence of full model payloads.
pub trait ModelStore {
    /// Loads the committed payload for `id`.
    ///
    /// Returns `RepoError::NotFound` when nothing was ever saved for `id`.
    fn load(&self, id: &ModelId) -> RepoResult<ModelData>;

    /// Commits `data` as the payload for `id` and returns its content hash.
    ///
    /// Idempotent; callers are responsible for skipping redundant writes.
    fn save(&self, id: &ModelId, data: &ModelData) -> RepoResult<ContentHash>;

    /// Runs `commit` as one unit: every store and registry write it makes
    /// lands, or none does.
    fn atomically<T>(&self, commit: impl FnOnce() -> RepoResult<T>) -> RepoResult<T>;
}

/// SQLite-backed payload store with an optional byte quota.
pub struct SqliteModelStore<'conn> {
    conn: &'conn Connection,
    max_payload_bytes: Option<u64>,
}

impl<'conn> SqliteModelStore<'conn> {
    /// Creates an unlimited store over a fully migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self {
            conn,
            max_payload_bytes: None,
        })
    }

    /// Rejects payloads whose serialized form exceeds `max_payload_bytes`.
    pub fn with_quota(mut self, max_payload_bytes: Option<u64>) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    /// Stored hash for `id` without decoding the payload.
    pub fn stored_hash(&self, id: &ModelId) -> RepoResult<Option<ContentHash>> {
        let hash: Option<String> = self
            .conn
            .query_row(
                "SELECT content_hash FROM model_payloads WHERE model_id = ?1;",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash.map(ContentHash::from_hex))
    }
}

impl ModelStore for SqliteModelStore<'_> {
    fn load(&self, id: &ModelId) -> RepoResult<ModelData> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT payload, content_hash FROM model_payloads WHERE model_id = ?1;",
                [id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (payload, stored_hash) = row.ok_or_else(|| RepoError::NotFound(id.clone()))?;

        let data: ModelData = serde_json::from_str(&payload).map_err(|err| {
            RepoError::InvalidData(format!("payload for model {id} is not valid JSON: {err}"))
        })?;

        let computed = hash_model_data(&data);
        if computed.as_str() != stored_hash {
            warn!(
                "event=store_load module=repo status=hash_drift model_id={} stored={} computed={}",
                id,
                stored_hash.get(..12).unwrap_or(&stored_hash),
                computed.short()
            );
        }
        Ok(data)
    }

    fn save(&self, id: &ModelId, data: &ModelData) -> RepoResult<ContentHash> {
        let payload = serde_json::to_string(data).map_err(RepoError::Encode)?;
        let byte_len = payload.len() as u64;

        if let Some(limit) = self.max_payload_bytes {
            if byte_len > limit {
                error!(
                    "event=store_save module=repo status=error model_id={} error_code=quota_exceeded byte_len={} limit={}",
                    id, byte_len, limit
                );
                return Err(RepoError::QuotaExceeded {
                    model_id: id.clone(),
                    byte_len,
                    limit,
                });
            }
        }

        let content_hash = hash_model_data(data);
        self.conn.execute(
            "INSERT INTO model_payloads (model_id, payload, content_hash, byte_len, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(model_id) DO UPDATE SET
                payload = excluded.payload,
                content_hash = excluded.content_hash,
                byte_len = excluded.byte_len,
                saved_at = excluded.saved_at;",
            params![
                id.as_str(),
                payload,
                content_hash.as_str(),
                byte_len as i64,
                now_epoch_ms(),
            ],
        )?;
        Ok(content_hash)
    }

    fn atomically<T>(&self, commit: impl FnOnce() -> RepoResult<T>) -> RepoResult<T> {
        // Nested calls join the outer transaction.
        if !self.conn.is_autocommit() {
            return commit();
        }
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let value = commit()?;
        tx.commit()?;
        Ok(value)
    }
}
