//! Import reconciliation for externally supplied model files.
//!
//! # Responsibility
//! - Parse the two accepted file shapes (`{metadata, data}` envelope or a bare
//!   object with `elements`/`relationships`) into a normalized payload.
//! - Decide whether the file is a new model, an identical re-open, or a
//!   conflicting revision of a local model.
//! - Apply an explicit resolution to a pending conflict.
//!
//! # Invariants
//! - A conflict performs no store or registry writes.
//! - Malformed input performs no writes.
//! - Every payload write commits in one transaction with its registry record.
//! - `KeepLocal` never hands back a payload whose hash the registry does not
//!   record for that model.
//! - Newly registered names never collide with an existing model name.

use crate::model::data::ModelData;
use crate::model::metadata::{ModelId, ModelMetadata};
use crate::model::now_epoch_ms;
use crate::repo::registry_repo::ModelRegistry;
use crate::repo::store_repo::ModelStore;
use crate::repo::RepoError;
use crate::sync::content_hash::{hash_model_data, ContentHash};
use log::{info, warn};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const IMPORTED_MODEL_NAME: &str = "Imported Model";

pub type ImportResult<T> = Result<T, ImportError>;

/// Reconciliation failure. Conflicts are outcomes, not errors.
#[derive(Debug)]
pub enum ImportError {
    /// Bytes are not one of the recognized file shapes.
    Malformed(String),
    Store(RepoError),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed import: {message}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(_) => None,
            Self::Store(err) => Some(err),
        }
    }
}

impl From<RepoError> for ImportError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Deferred decision: an import shares an id with a local model but differs
/// in content.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDescriptor {
    pub local_metadata: ModelMetadata,
    pub incoming_metadata: ModelMetadata,
    pub local_data: ModelData,
    pub incoming_data: ModelData,
}

impl ConflictDescriptor {
    pub fn model_id(&self) -> &ModelId {
        &self.local_metadata.id
    }
}

/// How a pending conflict is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Local payload stays; the file is recorded as last seen on disk.
    KeepLocal,
    /// Incoming payload replaces the local one under the same id.
    AdoptIncoming,
    /// Incoming payload is registered under a fresh id; local stays.
    KeepBoth,
}

impl ConflictResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep_local",
            Self::AdoptIncoming => "adopt_incoming",
            Self::KeepBoth => "keep_both",
        }
    }
}

/// Why an import ended in `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDisposition {
    /// Id was unknown; registered as a new model.
    Registered,
    /// Id was known and content identical.
    Reopened,
    /// Id was registered but had no payload; incoming payload committed.
    Repaired,
    Resolved(ConflictResolution),
}

/// Import that settled into a usable local model.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedImport {
    pub metadata: ModelMetadata,
    pub data: ModelData,
    pub disposition: ImportDisposition,
}

/// Three-way import result; errors travel in the surrounding `Result`.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Loaded(LoadedImport),
    Conflict(Box<ConflictDescriptor>),
}

/// Parsed and normalized import before any decision is made.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedImport {
    pub declared_id: Option<ModelId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<i64>,
    pub data: ModelData,
    pub content_hash: ContentHash,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeclaredMetadata {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    created_at: Option<i64>,
}

/// Parses raw bytes into a normalized import.
pub fn parse_import(bytes: &[u8]) -> ImportResult<ParsedImport> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|err| ImportError::Malformed(format!("not valid JSON: {err}")))?;
    let Value::Object(mut root) = root else {
        return Err(ImportError::Malformed(
            "top-level value must be an object".to_string(),
        ));
    };

    let (declared, data_value) = if is_envelope(&root) {
        let metadata = root.remove("metadata").unwrap_or(Value::Null);
        let data = root.remove("data").unwrap_or(Value::Null);
        let declared = if metadata.is_null() {
            DeclaredMetadata::default()
        } else {
            serde_json::from_value(metadata)
                .map_err(|err| ImportError::Malformed(format!("invalid metadata: {err}")))?
        };
        (declared, data)
    } else if root.contains_key("elements") || root.contains_key("relationships") {
        (DeclaredMetadata::default(), Value::Object(root))
    } else {
        return Err(ImportError::Malformed(
            "expected {metadata, data} or an object with elements/relationships".to_string(),
        ));
    };

    let data: ModelData = serde_json::from_value(data_value)
        .map_err(|err| ImportError::Malformed(format!("invalid model data: {err}")))?;
    let content_hash = hash_model_data(&data);

    Ok(ParsedImport {
        declared_id: declared.id.as_deref().and_then(ModelId::parse),
        name: declared.name.filter(|name| !name.trim().is_empty()),
        description: declared.description,
        created_at: declared.created_at,
        data,
        content_hash,
    })
}

fn is_envelope(root: &Map<String, Value>) -> bool {
    matches!(root.get("data"), Some(Value::Object(_)))
        && matches!(root.get("metadata"), Some(Value::Object(_)) | Some(Value::Null) | None)
}

/// Accepts epoch milliseconds or an RFC 3339 string.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|ms| ms as i64)),
        Some(Value::String(text)) => chrono::DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|parsed| parsed.timestamp_millis()),
        _ => None,
    })
}

/// Returns `base` or `base (n)` with the smallest `n >= 1` that is unused.
pub fn unique_model_name(base: &str, existing: &[ModelMetadata]) -> String {
    let base = base.trim();
    let taken = |candidate: &str| existing.iter().any(|model| model.name.trim() == candidate);
    if !taken(base) {
        return base.to_string();
    }
    (1u32..)
        .map(|suffix| format!("{base} ({suffix})"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn name_from_filename(filename: Option<&str>) -> Option<String> {
    let stem = Path::new(filename?).file_stem()?.to_string_lossy();
    let stem = stem.trim();
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// Decides what an import means against the local registry and store.
pub struct ImportReconciler<'a, R: ModelRegistry, S: ModelStore> {
    registry: &'a R,
    store: &'a S,
}

impl<'a, R: ModelRegistry, S: ModelStore> ImportReconciler<'a, R, S> {
    pub fn new(registry: &'a R, store: &'a S) -> Self {
        Self { registry, store }
    }

    /// Parses `bytes` and reconciles them with local state.
    pub fn reconcile(&self, bytes: &[u8], filename: Option<&str>) -> ImportResult<ImportOutcome> {
        let parsed = parse_import(bytes)?;
        self.reconcile_parsed(parsed, filename)
    }

    pub fn reconcile_parsed(
        &self,
        parsed: ParsedImport,
        filename: Option<&str>,
    ) -> ImportResult<ImportOutcome> {
        let filename = filename.map(str::to_string);
        let existing = match &parsed.declared_id {
            Some(id) => self.registry.get(id)?,
            None => None,
        };

        let Some(local_metadata) = existing else {
            return self.register_new(parsed, filename);
        };

        let local_data = match self.store.load(&local_metadata.id) {
            Ok(data) => data,
            Err(RepoError::NotFound(_)) => {
                warn!(
                    "event=import_reconcile module=sync status=repair model_id={} reason=missing_payload",
                    local_metadata.id
                );
                return self.commit_over(local_metadata, parsed, filename, ImportDisposition::Repaired);
            }
            Err(err) => return Err(err.into()),
        };
        let local_hash = hash_model_data(&local_data);

        if local_hash == parsed.content_hash {
            let mut metadata = local_metadata;
            if metadata.last_disk_hash.as_ref() != Some(&local_hash) || filename.is_some() {
                metadata.stamp_disk(local_hash, filename);
                self.registry.upsert(&metadata)?;
            }
            info!(
                "event=import_reconcile module=sync status=ok outcome=reopened model_id={}",
                metadata.id
            );
            return Ok(ImportOutcome::Loaded(LoadedImport {
                metadata,
                data: local_data,
                disposition: ImportDisposition::Reopened,
            }));
        }

        let mut incoming_metadata = local_metadata.clone();
        if let Some(name) = &parsed.name {
            incoming_metadata.name = name.clone();
        }
        if let Some(description) = &parsed.description {
            incoming_metadata.description = description.clone();
        }
        incoming_metadata.content_hash = parsed.content_hash.clone();
        incoming_metadata.last_disk_hash = Some(parsed.content_hash.clone());
        if filename.is_some() {
            incoming_metadata.filename = filename;
        }

        info!(
            "event=import_reconcile module=sync status=ok outcome=conflict model_id={} local_hash={} incoming_hash={}",
            local_metadata.id,
            local_hash.short(),
            parsed.content_hash.short()
        );
        Ok(ImportOutcome::Conflict(Box::new(ConflictDescriptor {
            local_metadata,
            incoming_metadata,
            local_data,
            incoming_data: parsed.data,
        })))
    }

    /// Settles `conflict` and performs the writes the resolution implies.
    pub fn resolve(
        &self,
        conflict: ConflictDescriptor,
        resolution: ConflictResolution,
    ) -> ImportResult<LoadedImport> {
        let disposition = ImportDisposition::Resolved(resolution);
        let loaded = match resolution {
            ConflictResolution::KeepLocal => {
                let mut metadata = self
                    .registry
                    .get(conflict.model_id())?
                    .unwrap_or(conflict.local_metadata);
                // Autosave may have moved the store past the snapshot; trust
                // it only while it still matches the registry record.
                let stored = match self.store.load(&metadata.id) {
                    Ok(data) if hash_model_data(&data) == metadata.content_hash => Some(data),
                    Ok(_) | Err(RepoError::NotFound(_)) => None,
                    Err(err) => return Err(err.into()),
                };
                let restore = stored.is_none();
                let data = stored.unwrap_or(conflict.local_data);
                if restore {
                    warn!(
                        "event=conflict_resolve module=sync status=restore model_id={} reason=store_diverged",
                        metadata.id
                    );
                }
                self.store.atomically(|| {
                    if restore {
                        let content_hash = self.store.save(&metadata.id, &data)?;
                        metadata.touch(content_hash, now_epoch_ms());
                    }
                    metadata.stamp_disk(
                        conflict.incoming_metadata.content_hash,
                        conflict.incoming_metadata.filename,
                    );
                    self.registry.upsert(&metadata)
                })?;
                LoadedImport {
                    metadata,
                    data,
                    disposition,
                }
            }
            ConflictResolution::AdoptIncoming => {
                let mut metadata = conflict.incoming_metadata;
                self.store.atomically(|| {
                    let content_hash = self
                        .store
                        .save(&conflict.local_metadata.id, &conflict.incoming_data)?;
                    metadata.touch(content_hash.clone(), now_epoch_ms());
                    metadata.last_disk_hash = Some(content_hash);
                    self.registry.upsert(&metadata)
                })?;
                LoadedImport {
                    metadata,
                    data: conflict.incoming_data,
                    disposition,
                }
            }
            ConflictResolution::KeepBoth => {
                let existing = self.registry.list()?;
                let name = unique_model_name(&conflict.incoming_metadata.name, &existing);
                let id = ModelId::generate();
                let metadata = self.store.atomically(|| {
                    let content_hash = self.store.save(&id, &conflict.incoming_data)?;
                    let mut metadata =
                        ModelMetadata::new(id.clone(), name, content_hash, now_epoch_ms());
                    metadata.description = conflict.incoming_metadata.description.clone();
                    self.registry.upsert(&metadata)?;
                    Ok(metadata)
                })?;
                LoadedImport {
                    metadata,
                    data: conflict.incoming_data,
                    disposition,
                }
            }
        };

        info!(
            "event=conflict_resolve module=sync status=ok resolution={}",
            resolution.as_str()
        );
        Ok(loaded)
    }

    fn register_new(
        &self,
        parsed: ParsedImport,
        filename: Option<String>,
    ) -> ImportResult<ImportOutcome> {
        let existing = self.registry.list()?;
        let base_name = parsed
            .name
            .clone()
            .or_else(|| name_from_filename(filename.as_deref()))
            .unwrap_or_else(|| IMPORTED_MODEL_NAME.to_string());
        let name = unique_model_name(&base_name, &existing);
        let id = parsed.declared_id.clone().unwrap_or_else(ModelId::generate);

        let now = now_epoch_ms();
        let mut metadata = ModelMetadata::new(id, name, parsed.content_hash.clone(), now);
        metadata.created_at = parsed.created_at.unwrap_or(now);
        metadata.description = parsed.description.clone().unwrap_or_default();
        self.commit_over(metadata, parsed, filename, ImportDisposition::Registered)
    }

    fn commit_over(
        &self,
        mut metadata: ModelMetadata,
        parsed: ParsedImport,
        filename: Option<String>,
        disposition: ImportDisposition,
    ) -> ImportResult<ImportOutcome> {
        self.store.atomically(|| {
            let content_hash = self.store.save(&metadata.id, &parsed.data)?;
            metadata.touch(content_hash.clone(), now_epoch_ms());
            metadata.stamp_disk(content_hash, filename);
            self.registry.upsert(&metadata)
        })?;

        info!(
            "event=import_reconcile module=sync status=ok outcome={:?} model_id={} hash={}",
            disposition,
            metadata.id,
            metadata.content_hash.short()
        );
        Ok(ImportOutcome::Loaded(LoadedImport {
            metadata,
            data: parsed.data,
            disposition,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::{name_from_filename, parse_import, unique_model_name, ImportError};
    use crate::model::metadata::{ModelId, ModelMetadata};
    use crate::sync::content_hash::ContentHash;

    fn named(name: &str) -> ModelMetadata {
        ModelMetadata::new(ModelId::generate(), name, ContentHash::from_hex("00"), 0)
    }

    #[test]
    fn unique_name_appends_incrementing_suffix() {
        let existing = vec![named("Alpha"), named("Alpha (1)")];
        assert_eq!(unique_model_name("Beta", &existing), "Beta");
        assert_eq!(unique_model_name("Alpha", &existing), "Alpha (2)");
    }

    #[test]
    fn filename_stem_becomes_fallback_name() {
        assert_eq!(name_from_filename(Some("dir/Map.json")).as_deref(), Some("Map"));
        assert_eq!(name_from_filename(None), None);
    }

    #[test]
    fn parses_envelope_with_rfc3339_created_at() {
        let bytes = br#"{
            "metadata": { "id": "m-1", "name": "Alpha", "createdAt": "2024-01-02T03:04:05Z" },
            "data": { "elements": [{ "id": "e1", "name": "Node" }] }
        }"#;
        let parsed = parse_import(bytes).unwrap();
        assert_eq!(parsed.declared_id.unwrap().as_str(), "m-1");
        assert_eq!(parsed.name.as_deref(), Some("Alpha"));
        assert_eq!(parsed.created_at, Some(1_704_164_645_000));
        assert_eq!(parsed.data.elements.len(), 1);
        assert!(parsed.data.relationships.is_empty());
    }

    #[test]
    fn parses_bare_graph_without_metadata() {
        let parsed = parse_import(br#"{ "relationships": null, "elements": [] }"#).unwrap();
        assert!(parsed.declared_id.is_none());
        assert!(parsed.data.elements.is_empty());
        assert!(parsed.data.relationships.is_empty());
    }

    #[test]
    fn rejects_unrecognized_shapes() {
        for bytes in [
            &b"not json"[..],
            &b"[1, 2, 3]"[..],
            &br#"{ "nodes": [] }"#[..],
            &br#"{ "elements": [{ "name": "missing id" }] }"#[..],
        ] {
            let err = parse_import(bytes).unwrap_err();
            assert!(matches!(err, ImportError::Malformed(_)), "{err}");
        }
    }
}
