//! Snapshot-provider seam between the UI layer and the engine.

use crate::model::data::ModelData;

/// Live editing state owned by the UI layer.
///
/// The engine reads it through `snapshot` and replaces it through
/// `rehydrate` after a successful load; it never assumes a particular
/// reactivity mechanism.
pub trait WorkingCopy {
    /// Current value of every tracked facet.
    fn snapshot(&self) -> ModelData;

    /// Replaces all facets after a load, import or conflict resolution.
    fn rehydrate(&mut self, data: ModelData);
}

/// Plain in-memory working copy for hosts without their own state store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryWorkingCopy {
    data: ModelData,
}

impl InMemoryWorkingCopy {
    pub fn new(data: ModelData) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &ModelData {
        &self.data
    }

    /// Mutable access for edits; callers run autosave afterwards.
    pub fn data_mut(&mut self) -> &mut ModelData {
        &mut self.data
    }
}

impl WorkingCopy for InMemoryWorkingCopy {
    fn snapshot(&self) -> ModelData {
        self.data.clone()
    }

    fn rehydrate(&mut self, data: ModelData) {
        self.data = data;
    }
}
