//! Model registry contract and SQLite implementation.
//!
//! # Invariants
//! - `list()` returns records in first-registration order.
//! - `upsert()` replaces a record by id in place or appends a new one; the
//!   registration position of an existing id never changes.
//! - The last-opened pointer only ever names a registered model.

use super::{ensure_connection_ready, RepoError, RepoResult};
use crate::model::metadata::{ModelId, ModelMetadata};
use crate::sync::content_hash::ContentHash;
use rusqlite::{params, Connection, OptionalExtension, Row};

const MODEL_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    filename,
    content_hash,
    last_disk_hash,
    created_at,
    updated_at
FROM models";

const LAST_OPENED_KEY: &str = "last_opened_model_id";

/// Registry of lightweight model records.
pub trait ModelRegistry {
    fn list(&self) -> RepoResult<Vec<ModelMetadata>>;
    fn get(&self, id: &ModelId) -> RepoResult<Option<ModelMetadata>>;
    fn upsert(&self, metadata: &ModelMetadata) -> RepoResult<()>;
    fn set_last_opened(&self, id: &ModelId) -> RepoResult<()>;
    fn last_opened(&self) -> RepoResult<Option<ModelId>>;
}

/// SQLite-backed model registry.
pub struct SqliteModelRegistry<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteModelRegistry<'conn> {
    /// Creates a registry over a fully migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ModelRegistry for SqliteModelRegistry<'_> {
    fn list(&self) -> RepoResult<Vec<ModelMetadata>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MODEL_SELECT_SQL} ORDER BY seq ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut models = Vec::new();
        while let Some(row) = rows.next()? {
            models.push(parse_model_row(row)?);
        }
        Ok(models)
    }

    fn get(&self, id: &ModelId) -> RepoResult<Option<ModelMetadata>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MODEL_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_model_row(row)?));
        }
        Ok(None)
    }

    fn upsert(&self, metadata: &ModelMetadata) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO models (
                id,
                seq,
                name,
                description,
                filename,
                content_hash,
                last_disk_hash,
                created_at,
                updated_at
            ) VALUES (
                ?1,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM models),
                ?2, ?3, ?4, ?5, ?6, ?7, ?8
            )
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                filename = excluded.filename,
                content_hash = excluded.content_hash,
                last_disk_hash = excluded.last_disk_hash,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at;",
            params![
                metadata.id.as_str(),
                metadata.name.as_str(),
                metadata.description.as_str(),
                metadata.filename.as_deref(),
                metadata.content_hash.as_str(),
                metadata.last_disk_hash.as_ref().map(ContentHash::as_str),
                metadata.created_at,
                metadata.updated_at,
            ],
        )?;
        Ok(())
    }

    fn set_last_opened(&self, id: &ModelId) -> RepoResult<()> {
        let registered: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM models WHERE id = ?1);",
            [id.as_str()],
            |row| row.get(0),
        )?;
        if !registered {
            return Err(RepoError::NotFound(id.clone()));
        }

        self.conn.execute(
            "INSERT INTO app_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![LAST_OPENED_KEY, id.as_str()],
        )?;
        Ok(())
    }

    fn last_opened(&self) -> RepoResult<Option<ModelId>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1;",
                [LAST_OPENED_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.as_deref().and_then(ModelId::parse))
    }
}

fn parse_model_row(row: &Row<'_>) -> RepoResult<ModelMetadata> {
    let id_text: String = row.get("id")?;
    let id = ModelId::parse(&id_text)
        .ok_or_else(|| RepoError::InvalidData("blank id in models.id".to_string()))?;

    let content_hash: String = row.get("content_hash")?;
    if content_hash.is_empty() {
        return Err(RepoError::InvalidData(format!(
            "empty content hash for model {id}"
        )));
    }

    Ok(ModelMetadata {
        id,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        filename: row.get("filename")?,
        content_hash: ContentHash::from_hex(content_hash),
        last_disk_hash: row
            .get::<_, Option<String>>("last_disk_hash")?
            .map(ContentHash::from_hex),
    })
}
