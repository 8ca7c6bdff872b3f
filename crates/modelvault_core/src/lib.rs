//! Core persistence logic for ModelVault.
//! Local-first storage, import reconciliation and external file sync for
//! graph models.

pub mod bridge;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;
pub mod taxonomy;

pub use bridge::{
    select_file_bridge, BridgeError, BridgeMode, DirectoryHost, FileBridge, FileHandle, FileHost,
};
pub use config::{ConfigError, EngineConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::data::{GraphElement, ModelData, Relationship};
pub use model::envelope::ModelEnvelope;
pub use model::metadata::{ModelId, ModelMetadata};
pub use model::taxonomy::{RelationshipType, TaxonomyScheme};
pub use repo::registry_repo::{ModelRegistry, SqliteModelRegistry};
pub use repo::store_repo::{ModelStore, SqliteModelStore};
pub use repo::{RepoError, RepoResult};
pub use service::engine::{
    DiskSaveOutcome, EngineError, EngineResult, ImportReport, OpenedModel, PersistenceEngine,
};
pub use service::working_copy::{InMemoryWorkingCopy, WorkingCopy};
pub use sync::autosave::{AutosaveError, AutosaveOutcome};
pub use sync::content_hash::{hash_model_data, ContentHash};
pub use sync::reconcile::{ConflictDescriptor, ConflictResolution, ImportDisposition};
pub use sync::session::Lifecycle;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
