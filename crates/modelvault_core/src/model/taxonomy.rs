//! Customizable taxonomy carried by every model.
//!
//! A scheme maps tags to colors/descriptions and owns a catalog of
//! relationship types. Older payloads stored the catalog as a flat list of
//! labels under `relationshipLabels`; that shape still deserializes and is
//! converted by `crate::taxonomy::migrate_schemes`.

use super::null_as_default;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of a scheme's relationship-type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipType {
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

impl RelationshipType {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
        }
    }
}

/// Named tag-color and relationship-type scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyScheme {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tag_colors: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tag_descriptions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_definitions: Option<Vec<RelationshipType>>,
    /// Legacy flat catalog. Never written by migrated payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_labels: Option<Vec<String>>,
}

impl TaxonomyScheme {
    /// Structured relationship catalog; empty when only the legacy shape is set.
    pub fn definitions(&self) -> &[RelationshipType] {
        self.relationship_definitions.as_deref().unwrap_or(&[])
    }

    pub fn has_relationship_label(&self, label: &str) -> bool {
        self.definitions().iter().any(|entry| entry.label == label)
    }

    pub fn uses_legacy_catalog(&self) -> bool {
        self.relationship_labels.is_some()
    }
}
