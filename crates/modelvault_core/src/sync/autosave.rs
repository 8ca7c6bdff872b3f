//! Hash-gated commits of the working copy to the model store.
//!
//! # Invariants
//! - Nothing is written unless the session is `Ready`.
//! - Nothing is written when the working-copy hash equals the registry's
//!   recorded `content_hash`; this is the only redundant-write guard.
//! - The payload and the registry record commit in one transaction, so a
//!   registry hash never points at a payload that was not committed.

use crate::model::data::ModelData;
use crate::model::metadata::{ModelId, ModelMetadata};
use crate::model::now_epoch_ms;
use crate::repo::registry_repo::ModelRegistry;
use crate::repo::store_repo::ModelStore;
use crate::repo::RepoError;
use crate::sync::content_hash::{hash_model_data, ContentHash};
use crate::sync::session::{Lifecycle, ModelSession};
use log::{debug, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type AutosaveResult<T> = Result<T, AutosaveError>;

/// Repository failure split by the side of the commit it happened on.
#[derive(Debug)]
pub enum AutosaveError {
    /// Reading the registry record failed; nothing was written.
    Read(RepoError),
    /// The commit was rejected and rolled back.
    Write(RepoError),
}

impl Display for AutosaveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read(err) => write!(f, "autosave read failed: {err}"),
            Self::Write(err) => write!(f, "autosave commit failed: {err}"),
        }
    }
}

impl Error for AutosaveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read(err) | Self::Write(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveOutcome {
    /// Gate closed; nothing was hashed or written.
    NotReady(Lifecycle),
    /// No active model to commit to.
    NoActiveModel,
    Unchanged(ContentHash),
    Committed(ModelMetadata),
}

/// Commits the working copy of the active model when its hash changed.
pub struct AutosaveController<'a, R: ModelRegistry, S: ModelStore> {
    registry: &'a R,
    store: &'a S,
}

impl<'a, R: ModelRegistry, S: ModelStore> AutosaveController<'a, R, S> {
    pub fn new(registry: &'a R, store: &'a S) -> Self {
        Self { registry, store }
    }

    /// Runs on every tracked change of the working copy.
    pub fn on_change(
        &self,
        session: &ModelSession,
        working_copy: &ModelData,
    ) -> AutosaveResult<AutosaveOutcome> {
        if !session.is_ready() {
            debug!(
                "event=autosave module=sync status=skip reason=lifecycle lifecycle={}",
                session.lifecycle().as_str()
            );
            return Ok(AutosaveOutcome::NotReady(session.lifecycle()));
        }
        let Some(id) = session.active_model_id() else {
            return Ok(AutosaveOutcome::NoActiveModel);
        };
        self.commit_if_changed(id, working_copy)
    }

    /// Ungated commit used by explicit saves.
    pub fn commit_if_changed(
        &self,
        id: &ModelId,
        working_copy: &ModelData,
    ) -> AutosaveResult<AutosaveOutcome> {
        let mut metadata = self
            .registry
            .get(id)
            .map_err(AutosaveError::Read)?
            .ok_or_else(|| AutosaveError::Read(RepoError::NotFound(id.clone())))?;
        let current = hash_model_data(working_copy);
        if current == metadata.content_hash {
            return Ok(AutosaveOutcome::Unchanged(current));
        }

        self.store
            .atomically(|| {
                let committed = self.store.save(id, working_copy)?;
                metadata.touch(committed, now_epoch_ms());
                self.registry.upsert(&metadata)
            })
            .map_err(AutosaveError::Write)?;

        info!(
            "event=autosave module=sync status=ok model_id={} hash={}",
            id,
            metadata.content_hash.short()
        );
        Ok(AutosaveOutcome::Committed(metadata))
    }
}
