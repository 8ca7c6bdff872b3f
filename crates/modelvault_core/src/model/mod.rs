//! Model domain types.
//!
//! # Responsibility
//! - Define the registry record (`ModelMetadata`) and the full payload
//!   (`ModelData`) shared by the store, the reconciler and the engine.
//! - Define the customizable taxonomy (`TaxonomyScheme`).
//!
//! # Invariants
//! - A `ModelId` is immutable and never reused for another model.
//! - `ModelData.elements` and `ModelData.relationships` are always arrays
//!   after deserialization, even when the source omitted them or sent `null`.

pub mod data;
pub mod envelope;
pub mod metadata;
pub mod taxonomy;

use serde::{Deserialize, Deserializer};

/// Deserializes `null` as the type's default value.
///
/// Pair with `#[serde(default)]` so that a missing key also yields the default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Current wall clock in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
