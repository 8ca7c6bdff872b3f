//! Built-in taxonomy catalog and additive taxonomy migration.
//!
//! # Invariants
//! - Migration never removes a tag, color, description or relationship type
//!   that is already present in a loaded scheme.
//! - Migration is idempotent: a second pass reports no changes.

pub mod defaults;
pub mod migrate;

pub use defaults::{builtin_scheme, builtin_schemes};
pub use migrate::{migrate_model_taxonomy, migrate_schemes, MigrationReport};
