//! Explicit session state owned by the persistence engine.
//!
//! # Invariants
//! - Autosave only runs while the lifecycle is `Ready`.
//! - A retained file handle always belongs to the active model; switching
//!   models drops it.
//! - At most one import conflict is pending at a time.
//! - At most one external write per model id is in flight.

use crate::bridge::FileHandle;
use crate::model::metadata::ModelId;
use crate::sync::reconcile::ConflictDescriptor;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Load gate for the autosave path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    /// A load, import or migration is in flight.
    Loading,
    Ready,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
        }
    }
}

/// Per-model exclusion for external writes.
///
/// Cloning shares the underlying set, so a host can hold tickets across
/// threads while the engine checks them.
#[derive(Debug, Clone, Default)]
pub struct DiskWriteLocks {
    in_flight: Arc<Mutex<BTreeSet<ModelId>>>,
}

impl DiskWriteLocks {
    /// Claims the write slot for `id`; `None` when a write is already pending.
    pub fn try_acquire(&self, id: &ModelId) -> Option<DiskWriteTicket> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(id.clone()) {
            return None;
        }
        Some(DiskWriteTicket {
            id: id.clone(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_pending(&self, id: &ModelId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(id)
    }
}

/// Releases its model's write slot on drop.
#[derive(Debug)]
pub struct DiskWriteTicket {
    id: ModelId,
    in_flight: Arc<Mutex<BTreeSet<ModelId>>>,
}

impl DiskWriteTicket {
    pub fn model_id(&self) -> &ModelId {
        &self.id
    }
}

impl Drop for DiskWriteTicket {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

/// Session state: lifecycle, active model, retained handle, pending conflict.
#[derive(Debug)]
pub struct ModelSession {
    lifecycle: Lifecycle,
    active_model_id: Option<ModelId>,
    retained_handle: Option<FileHandle>,
    pending_conflict: Option<ConflictDescriptor>,
    disk_writes: DiskWriteLocks,
}

impl Default for ModelSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSession {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            active_model_id: None,
            retained_handle: None,
            pending_conflict: None,
            disk_writes: DiskWriteLocks::default(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    /// Closes the autosave gate and returns the state to restore on failure.
    pub fn begin_loading(&mut self) -> Lifecycle {
        std::mem::replace(&mut self.lifecycle, Lifecycle::Loading)
    }

    pub fn finish_loading(&mut self) {
        self.lifecycle = Lifecycle::Ready;
    }

    pub fn abort_loading(&mut self, previous: Lifecycle) {
        self.lifecycle = previous;
    }

    pub fn active_model_id(&self) -> Option<&ModelId> {
        self.active_model_id.as_ref()
    }

    /// Makes `id` the active model; drops the handle of a different model.
    pub fn activate(&mut self, id: ModelId) {
        if self.active_model_id.as_ref() != Some(&id) {
            self.retained_handle = None;
        }
        self.active_model_id = Some(id);
    }

    pub fn retained_handle(&self) -> Option<&FileHandle> {
        self.retained_handle.as_ref()
    }

    pub fn retain_handle(&mut self, handle: FileHandle) {
        self.retained_handle = Some(handle);
    }

    pub fn pending_conflict(&self) -> Option<&ConflictDescriptor> {
        self.pending_conflict.as_ref()
    }

    pub fn set_pending_conflict(&mut self, conflict: ConflictDescriptor) {
        self.pending_conflict = Some(conflict);
    }

    pub fn take_pending_conflict(&mut self) -> Option<ConflictDescriptor> {
        self.pending_conflict.take()
    }

    pub fn disk_writes(&self) -> &DiskWriteLocks {
        &self.disk_writes
    }
}

#[cfg(test)]
mod tests {
    use super::{DiskWriteLocks, Lifecycle, ModelSession};
    use crate::bridge::FileHandle;
    use crate::model::metadata::ModelId;

    #[test]
    fn loading_gate_restores_previous_state_on_abort() {
        let mut session = ModelSession::new();
        let previous = session.begin_loading();
        assert_eq!(previous, Lifecycle::Uninitialized);
        assert_eq!(session.lifecycle(), Lifecycle::Loading);

        session.abort_loading(previous);
        assert_eq!(session.lifecycle(), Lifecycle::Uninitialized);

        session.begin_loading();
        session.finish_loading();
        assert!(session.is_ready());
    }

    #[test]
    fn switching_models_drops_retained_handle() {
        let mut session = ModelSession::new();
        let first = ModelId::generate();
        session.activate(first.clone());
        session.retain_handle(FileHandle::new("/tmp/first.json"));

        session.activate(first);
        assert!(session.retained_handle().is_some());

        session.activate(ModelId::generate());
        assert!(session.retained_handle().is_none());
    }

    #[test]
    fn disk_write_ticket_is_exclusive_per_model_until_dropped() {
        let locks = DiskWriteLocks::default();
        let id = ModelId::generate();
        let other = ModelId::generate();

        let ticket = locks.try_acquire(&id).expect("first claim should succeed");
        assert_eq!(ticket.model_id(), &id);
        assert!(locks.try_acquire(&id).is_none());
        assert!(locks.try_acquire(&other).is_some());
        assert!(locks.is_pending(&id));

        drop(ticket);
        assert!(!locks.is_pending(&id));
        assert!(locks.try_acquire(&id).is_some());
    }
}
