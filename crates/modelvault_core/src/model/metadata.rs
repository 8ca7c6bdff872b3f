//! Registry record for one model.
//!
//! # Invariants
//! - `content_hash` reflects the payload currently committed to the model
//!   store for `id`.
//! - `last_disk_hash` is only set after a successful external-file write or
//!   a resolved import.

use crate::sync::content_hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const MODEL_ID_PREFIX: &str = "model-";

/// Stable, globally unique model identifier.
///
/// Imported files may carry ids minted by other builds, so any non-empty
/// string is accepted; locally minted ids are `model-<uuid v4>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Mints a fresh id.
    pub fn generate() -> Self {
        Self(format!("{MODEL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Wraps an existing id. Returns `None` for blank input.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ModelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lightweight registry record, listed without loading payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub id: ModelId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the last committed payload change.
    pub updated_at: i64,
    /// Name of the external file this model was last written to or read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub content_hash: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_disk_hash: Option<ContentHash>,
}

impl ModelMetadata {
    /// Creates a record for a model that has never been written to disk.
    pub fn new(id: ModelId, name: impl Into<String>, content_hash: ContentHash, now_ms: i64) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            created_at: now_ms,
            updated_at: now_ms,
            filename: None,
            content_hash,
            last_disk_hash: None,
        }
    }

    /// Whether the committed payload differs from the last external file.
    ///
    /// A model that was never written to disk always has unsaved changes.
    pub fn has_unsaved_changes(&self) -> bool {
        self.last_disk_hash.as_ref() != Some(&self.content_hash)
    }

    /// Records a newly committed payload hash.
    pub fn touch(&mut self, content_hash: ContentHash, now_ms: i64) {
        self.content_hash = content_hash;
        self.updated_at = now_ms;
    }

    /// Records a successful external write or resolved import.
    pub fn stamp_disk(&mut self, digest: ContentHash, filename: Option<String>) {
        self.last_disk_hash = Some(digest);
        if filename.is_some() {
            self.filename = filename;
        }
    }
}
