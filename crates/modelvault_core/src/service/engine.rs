//! Local-first persistence engine.
//!
//! # Responsibility
//! - Own the session (`lifecycle`, active model, retained handle, pending
//!   conflict) instead of ambient global flags.
//! - Route UI-driven operations through the registry, the store, the file
//!   bridge, the reconciler and the taxonomy migrator.
//!
//! # Invariants
//! - The working copy is only rehydrated after every store/registry write of
//!   an operation succeeded.
//! - Load-type operations close the autosave gate while in flight.
//! - A pending conflict blocks further imports of the same id until it is
//!   resolved or discarded.
//! - External writes for one model id never interleave.

use crate::bridge::{BridgeError, BridgeMode, FileBridge, ReadOutcome, WriteOutcome};
use crate::config::DEFAULT_MODEL_NAME;
use crate::model::data::ModelData;
use crate::model::metadata::{ModelId, ModelMetadata};
use crate::model::now_epoch_ms;
use crate::model::taxonomy::TaxonomyScheme;
use crate::repo::registry_repo::ModelRegistry;
use crate::repo::store_repo::ModelStore;
use crate::repo::RepoError;
use crate::service::working_copy::WorkingCopy;
use crate::sync::autosave::{AutosaveController, AutosaveError, AutosaveOutcome};
use crate::sync::reconcile::{
    parse_import, ConflictDescriptor, ConflictResolution, ImportDisposition, ImportError,
    ImportOutcome, ImportReconciler, LoadedImport,
};
use crate::sync::session::{Lifecycle, ModelSession};
use crate::taxonomy::{builtin_schemes, migrate_model_taxonomy};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level failure surfaced to hosts.
#[derive(Debug)]
pub enum EngineError {
    /// Imported bytes match neither accepted file shape.
    MalformedImport(String),
    /// Store or registry rejected a write; committed state is unchanged.
    StorageWriteFailure(RepoError),
    /// Store or registry read failed.
    Storage(RepoError),
    /// External file write failed (not a cancellation).
    FileWriteFailure(BridgeError),
    /// External file read failed (not a cancellation).
    FileReadFailure(BridgeError),
    NotReady(Lifecycle),
    AlreadyInitialized,
    NoActiveModel,
    ModelNotFound(ModelId),
    SaveInProgress(ModelId),
    ConflictPending(ModelId),
    NoPendingConflict,
}

impl EngineError {
    /// Stable code for log lines and host error mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedImport(_) => "malformed_import",
            Self::StorageWriteFailure(_) => "storage_write_failure",
            Self::Storage(_) => "storage_read_failure",
            Self::FileWriteFailure(_) => "file_write_failure",
            Self::FileReadFailure(_) => "file_read_failure",
            Self::NotReady(_) => "not_ready",
            Self::AlreadyInitialized => "already_initialized",
            Self::NoActiveModel => "no_active_model",
            Self::ModelNotFound(_) => "model_not_found",
            Self::SaveInProgress(_) => "save_in_progress",
            Self::ConflictPending(_) => "conflict_pending",
            Self::NoPendingConflict => "no_pending_conflict",
        }
    }

    fn write_failure(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(id) => Self::ModelNotFound(id),
            other => Self::StorageWriteFailure(other),
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedImport(message) => write!(f, "cannot import file: {message}"),
            Self::StorageWriteFailure(err) => write!(f, "could not save model: {err}"),
            Self::Storage(err) => write!(f, "could not read model storage: {err}"),
            Self::FileWriteFailure(err) => write!(f, "could not write file: {err}"),
            Self::FileReadFailure(err) => write!(f, "could not read file: {err}"),
            Self::NotReady(lifecycle) => {
                write!(f, "engine is not ready (lifecycle: {})", lifecycle.as_str())
            }
            Self::AlreadyInitialized => write!(f, "engine is already initialized"),
            Self::NoActiveModel => write!(f, "no model is open"),
            Self::ModelNotFound(id) => write!(f, "model not found: {id}"),
            Self::SaveInProgress(id) => write!(f, "a save for model {id} is already in progress"),
            Self::ConflictPending(id) => {
                write!(f, "an import conflict for model {id} must be resolved first")
            }
            Self::NoPendingConflict => write!(f, "no import conflict is pending"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageWriteFailure(err) | Self::Storage(err) => Some(err),
            Self::FileWriteFailure(err) | Self::FileReadFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::ModelNotFound(id),
            other => Self::Storage(other),
        }
    }
}

impl From<AutosaveError> for EngineError {
    fn from(value: AutosaveError) -> Self {
        match value {
            AutosaveError::Read(err) => err.into(),
            AutosaveError::Write(err) => Self::write_failure(err),
        }
    }
}

impl From<ImportError> for EngineError {
    fn from(value: ImportError) -> Self {
        match value {
            ImportError::Malformed(message) => Self::MalformedImport(message),
            ImportError::Store(err) if err.is_write_rejection() => Self::StorageWriteFailure(err),
            ImportError::Store(err) => err.into(),
        }
    }
}

/// A model that became active, with the taxonomy changes applied on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedModel {
    pub metadata: ModelMetadata,
    /// Informational; hosts surface it when non-empty.
    pub migration_changes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportReport {
    Loaded {
        model: OpenedModel,
        disposition: ImportDisposition,
    },
    /// Nothing was written; resolve or discard before re-importing this id.
    Conflict(Box<ConflictDescriptor>),
    /// The open picker was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskSaveOutcome {
    Saved(ModelMetadata),
    /// The save picker was cancelled; nothing was stamped.
    Cancelled,
}

/// Persistence engine over a registry, a store and a file bridge.
pub struct PersistenceEngine<R: ModelRegistry, S: ModelStore> {
    registry: R,
    store: S,
    bridge: Box<dyn FileBridge>,
    session: ModelSession,
    default_schemes: Vec<TaxonomyScheme>,
    default_model_name: String,
}

impl<R: ModelRegistry, S: ModelStore> PersistenceEngine<R, S> {
    pub fn new(registry: R, store: S, bridge: Box<dyn FileBridge>) -> Self {
        Self {
            registry,
            store,
            bridge,
            session: ModelSession::new(),
            default_schemes: builtin_schemes().to_vec(),
            default_model_name: DEFAULT_MODEL_NAME.to_string(),
        }
    }

    /// Name used when bootstrap has to create the first model.
    pub fn with_default_model_name(mut self, name: impl Into<String>) -> Self {
        self.default_model_name = name.into();
        self
    }

    /// Replaces the built-in taxonomy catalog used for new models and
    /// migration.
    pub fn with_default_schemes(mut self, schemes: Vec<TaxonomyScheme>) -> Self {
        self.default_schemes = schemes;
        self
    }

    pub fn session(&self) -> &ModelSession {
        &self.session
    }

    pub fn bridge_mode(&self) -> BridgeMode {
        self.bridge.mode()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Opens the last-opened model, else the first registered one, else a new
    /// default model, and opens the autosave gate.
    pub fn initialize(&mut self, working: &mut impl WorkingCopy) -> EngineResult<OpenedModel> {
        if self.session.lifecycle() != Lifecycle::Uninitialized {
            return Err(EngineError::AlreadyInitialized);
        }

        self.with_loading("engine_init", |engine| {
            let last_opened = match engine.registry.last_opened()? {
                Some(id) if engine.registry.get(&id)?.is_some() => Some(id),
                _ => None,
            };
            let target = match last_opened {
                Some(id) => Some(id),
                None => engine.registry.list()?.into_iter().next().map(|model| model.id),
            };
            match target {
                Some(id) => engine.load_into(&id, working),
                None => {
                    let name = engine.default_model_name.clone();
                    engine.create_into(&name, working)
                }
            }
        })
    }

    /// Creates, registers and activates an empty model.
    pub fn create_model(
        &mut self,
        name: &str,
        working: &mut impl WorkingCopy,
    ) -> EngineResult<OpenedModel> {
        let name = if name.trim().is_empty() {
            self.default_model_name.clone()
        } else {
            name.trim().to_string()
        };
        self.with_loading("model_create", |engine| engine.create_into(&name, working))
    }

    /// Loads a registered model, migrates its taxonomy and activates it.
    pub fn open_model(
        &mut self,
        id: &ModelId,
        working: &mut impl WorkingCopy,
    ) -> EngineResult<OpenedModel> {
        self.with_loading("model_open", |engine| engine.load_into(id, working))
    }

    /// Clones the working copy into a new model and makes it active.
    pub fn save_as(&mut self, name: &str, working: &impl WorkingCopy) -> EngineResult<ModelMetadata> {
        self.require_ready()?;
        let source = self.active_metadata()?;
        let data = working.snapshot();

        let id = ModelId::generate();
        let name = if name.trim().is_empty() {
            source.name.clone()
        } else {
            name.trim().to_string()
        };
        let metadata = self
            .store
            .atomically(|| {
                let content_hash = self.store.save(&id, &data)?;
                let mut metadata =
                    ModelMetadata::new(id.clone(), name, content_hash, now_epoch_ms());
                metadata.description = source.description.clone();
                self.registry.upsert(&metadata)?;
                self.registry.set_last_opened(&id)?;
                Ok(metadata)
            })
            .map_err(EngineError::write_failure)?;
        self.session.activate(id);

        info!(
            "event=model_save_as module=service status=ok source_id={} model_id={}",
            source.id, metadata.id
        );
        Ok(metadata)
    }

    /// Renames and/or re-describes the active model.
    pub fn update_details(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
    ) -> EngineResult<ModelMetadata> {
        let mut metadata = self.active_metadata()?;
        if let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) {
            metadata.name = name.to_string();
        }
        if let Some(description) = description {
            metadata.description = description.to_string();
        }
        self.registry
            .upsert(&metadata)
            .map_err(EngineError::write_failure)?;
        Ok(metadata)
    }

    /// Commits the working copy when its hash differs from the registry.
    ///
    /// Call after every tracked change; it is a no-op until `Ready`.
    pub fn autosave(&self, working: &impl WorkingCopy) -> EngineResult<AutosaveOutcome> {
        if !self.session.is_ready() {
            return Ok(AutosaveOutcome::NotReady(self.session.lifecycle()));
        }
        Ok(AutosaveController::new(&self.registry, &self.store)
            .on_change(&self.session, &working.snapshot())?)
    }

    /// Writes the active model to an external file and stamps
    /// `last_disk_hash`.
    pub fn save_to_disk(&mut self, working: &impl WorkingCopy) -> EngineResult<DiskSaveOutcome> {
        self.require_ready()?;
        let id = self.active_id()?;
        let _ticket = self
            .session
            .disk_writes()
            .try_acquire(&id)
            .ok_or_else(|| EngineError::SaveInProgress(id.clone()))?;

        let started_at = Instant::now();
        let data = working.snapshot();
        let committed =
            AutosaveController::new(&self.registry, &self.store).commit_if_changed(&id, &data)?;
        let mut metadata = match committed {
            AutosaveOutcome::Committed(metadata) => metadata,
            _ => self
                .registry
                .get(&id)?
                .ok_or_else(|| EngineError::ModelNotFound(id.clone()))?,
        };

        let mut exported = metadata.clone();
        exported.last_disk_hash = Some(metadata.content_hash.clone());
        let written = self
            .bridge
            .write(self.session.retained_handle(), &exported, &data);
        let receipt = match written {
            Ok(WriteOutcome::Written(receipt)) => receipt,
            Ok(WriteOutcome::Cancelled) => return Ok(DiskSaveOutcome::Cancelled),
            Err(err) => {
                error!(
                    "event=disk_save module=service status=error model_id={} duration_ms={} error_code=file_write_failure error={}",
                    id,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(EngineError::FileWriteFailure(err));
            }
        };

        if let Some(handle) = receipt.handle {
            self.session.retain_handle(handle);
        }
        metadata.stamp_disk(receipt.digest, Some(receipt.filename));
        self.registry
            .upsert(&metadata)
            .map_err(EngineError::write_failure)?;

        info!(
            "event=disk_save module=service status=ok model_id={} mode={} duration_ms={} digest={}",
            id,
            self.bridge.mode().as_str(),
            started_at.elapsed().as_millis(),
            metadata.content_hash.short()
        );
        Ok(DiskSaveOutcome::Saved(metadata))
    }

    /// Reads an external file through the bridge and imports it.
    pub fn open_from_disk(&mut self, working: &mut impl WorkingCopy) -> EngineResult<ImportReport> {
        let file = match self.bridge.read().map_err(EngineError::FileReadFailure)? {
            ReadOutcome::Read(file) => file,
            ReadOutcome::Cancelled => return Ok(ImportReport::Cancelled),
        };
        self.import_bytes(&file.bytes, Some(&file.filename), working)
    }

    /// Imports external bytes.
    ///
    /// `Loaded` rehydrates the working copy; `Conflict` writes nothing and
    /// becomes the pending conflict.
    pub fn import_bytes(
        &mut self,
        bytes: &[u8],
        filename: Option<&str>,
        working: &mut impl WorkingCopy,
    ) -> EngineResult<ImportReport> {
        let parsed = parse_import(bytes)?;
        if let Some(pending) = self.session.pending_conflict() {
            if parsed.declared_id.as_ref() == Some(pending.model_id()) {
                return Err(EngineError::ConflictPending(pending.model_id().clone()));
            }
        }

        self.with_loading("model_import", |engine| {
            let outcome =
                ImportReconciler::new(&engine.registry, &engine.store).reconcile_parsed(parsed, filename)?;
            match outcome {
                ImportOutcome::Loaded(loaded) => {
                    let disposition = loaded.disposition;
                    let model = engine.adopt_loaded(loaded, working)?;
                    Ok(ImportReport::Loaded { model, disposition })
                }
                ImportOutcome::Conflict(conflict) => {
                    if let Some(pending) = engine.session.pending_conflict() {
                        return Err(EngineError::ConflictPending(pending.model_id().clone()));
                    }
                    engine.session.set_pending_conflict((*conflict).clone());
                    Ok(ImportReport::Conflict(conflict))
                }
            }
        })
    }

    pub fn pending_conflict(&self) -> Option<&ConflictDescriptor> {
        self.session.pending_conflict()
    }

    /// Settles the pending conflict and activates the resulting model.
    ///
    /// On failure the conflict stays pending.
    pub fn resolve_conflict(
        &mut self,
        resolution: ConflictResolution,
        working: &mut impl WorkingCopy,
    ) -> EngineResult<OpenedModel> {
        let conflict = self
            .session
            .take_pending_conflict()
            .ok_or(EngineError::NoPendingConflict)?;

        let result = self.with_loading("conflict_resolve", |engine| {
            let loaded = ImportReconciler::new(&engine.registry, &engine.store)
                .resolve(conflict.clone(), resolution)?;
            engine.adopt_loaded(loaded, working)
        });
        if result.is_err() {
            self.session.set_pending_conflict(conflict);
        }
        result
    }

    /// Drops the pending conflict without any write.
    pub fn discard_conflict(&mut self) -> Option<ConflictDescriptor> {
        let conflict = self.session.take_pending_conflict();
        if let Some(conflict) = &conflict {
            info!(
                "event=conflict_discard module=service status=ok model_id={}",
                conflict.model_id()
            );
        }
        conflict
    }

    pub fn list_models(&self) -> EngineResult<Vec<ModelMetadata>> {
        Ok(self.registry.list()?)
    }

    pub fn active_metadata(&self) -> EngineResult<ModelMetadata> {
        let id = self.active_id()?;
        self.registry
            .get(&id)?
            .ok_or(EngineError::ModelNotFound(id))
    }

    /// Whether the active model differs from its last external file.
    pub fn has_unsaved_changes(&self) -> EngineResult<bool> {
        Ok(self.active_metadata()?.has_unsaved_changes())
    }

    fn require_ready(&self) -> EngineResult<()> {
        if self.session.is_ready() {
            Ok(())
        } else {
            Err(EngineError::NotReady(self.session.lifecycle()))
        }
    }

    fn active_id(&self) -> EngineResult<ModelId> {
        self.session
            .active_model_id()
            .cloned()
            .ok_or(EngineError::NoActiveModel)
    }

    /// Runs `op` with the autosave gate closed.
    ///
    /// The gate reopens when a model is active afterwards; otherwise the
    /// previous lifecycle is restored.
    fn with_loading<T>(
        &mut self,
        event: &'static str,
        op: impl FnOnce(&mut Self) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let started_at = Instant::now();
        let previous = self.session.begin_loading();

        let result = op(self);
        match &result {
            Ok(_) => {
                if self.session.active_model_id().is_some() {
                    self.session.finish_loading();
                } else {
                    self.session.abort_loading(previous);
                }
                info!(
                    "event={event} module=service status=ok duration_ms={} lifecycle={}",
                    started_at.elapsed().as_millis(),
                    self.session.lifecycle().as_str()
                );
            }
            Err(err) => {
                self.session.abort_loading(previous);
                error!(
                    "event={event} module=service status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
            }
        }
        result
    }

    fn load_into(&mut self, id: &ModelId, working: &mut impl WorkingCopy) -> EngineResult<OpenedModel> {
        let metadata = self
            .registry
            .get(id)?
            .ok_or_else(|| EngineError::ModelNotFound(id.clone()))?;
        let data = self.store.load(id)?;
        self.activate_with(metadata, data, working)
    }

    fn create_into(&mut self, name: &str, working: &mut impl WorkingCopy) -> EngineResult<OpenedModel> {
        let data = ModelData::with_schemes(self.default_schemes.clone());
        let id = ModelId::generate();
        let metadata = self
            .store
            .atomically(|| {
                let content_hash = self.store.save(&id, &data)?;
                let metadata = ModelMetadata::new(id.clone(), name, content_hash, now_epoch_ms());
                self.registry.upsert(&metadata)?;
                Ok(metadata)
            })
            .map_err(EngineError::write_failure)?;
        self.activate_with(metadata, data, working)
    }

    fn adopt_loaded(
        &mut self,
        loaded: LoadedImport,
        working: &mut impl WorkingCopy,
    ) -> EngineResult<OpenedModel> {
        self.activate_with(loaded.metadata, loaded.data, working)
    }

    /// Migrates, records last-opened, activates, then rehydrates.
    fn activate_with(
        &mut self,
        metadata: ModelMetadata,
        mut data: ModelData,
        working: &mut impl WorkingCopy,
    ) -> EngineResult<OpenedModel> {
        let migration_changes = migrate_model_taxonomy(&mut data, &self.default_schemes);
        self.registry
            .set_last_opened(&metadata.id)
            .map_err(EngineError::write_failure)?;
        self.session.activate(metadata.id.clone());
        working.rehydrate(data);

        info!(
            "event=model_activate module=service status=ok model_id={} migration_changes={}",
            metadata.id,
            migration_changes.len()
        );
        Ok(OpenedModel {
            metadata,
            migration_changes,
        })
    }
}
