//! Full model payload.
//!
//! Graph elements and relationships are typed on the fields this crate reads
//! (`id`, labels, tags); everything else the canvas stores rides along in
//! `extra` untouched. Auxiliary facets the engine never inspects are kept as
//! opaque JSON values.

use super::null_as_default;
use super::taxonomy::TaxonomyScheme;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One node of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphElement {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl GraphElement {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tags: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Directed, labelled edge between two graph elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Relationship-type label from the active scheme's catalog.
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Everything a model persists besides its registry record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub elements: Vec<GraphElement>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relationships: Vec<Relationship>,
    /// Auxiliary markdown documents.
    #[serde(default, deserialize_with = "null_as_default")]
    pub documents: Vec<Value>,
    /// Folder tree for `documents`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub folders: Vec<Value>,
    /// Interaction history (assistant conversations, command log).
    #[serde(default, deserialize_with = "null_as_default")]
    pub history: Vec<Value>,
    /// Presentation slides.
    #[serde(default, deserialize_with = "null_as_default")]
    pub slides: Vec<Value>,
    /// Diagram definitions.
    #[serde(default, deserialize_with = "null_as_default")]
    pub diagrams: Vec<Value>,
    #[serde(default, rename = "colorSchemes", deserialize_with = "null_as_default")]
    pub schemes: Vec<TaxonomyScheme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_scheme_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_config: Option<Value>,
}

impl ModelData {
    /// Payload for a brand-new model: empty graph, the given schemes, first
    /// scheme active.
    pub fn with_schemes(schemes: Vec<TaxonomyScheme>) -> Self {
        let active_scheme_id = schemes.first().map(|scheme| scheme.id.clone());
        Self {
            schemes,
            active_scheme_id,
            ..Self::default()
        }
    }

    pub fn is_graph_empty(&self) -> bool {
        self.elements.is_empty() && self.relationships.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::ModelData;
    use serde_json::json;

    #[test]
    fn missing_or_null_graph_fields_become_empty_arrays() {
        let data: ModelData = serde_json::from_value(json!({ "elements": null })).unwrap();
        assert!(data.elements.is_empty());
        assert!(data.relationships.is_empty());

        let encoded = serde_json::to_value(&data).unwrap();
        assert_eq!(encoded["elements"], json!([]));
        assert_eq!(encoded["relationships"], json!([]));
    }

    #[test]
    fn unknown_element_fields_survive_a_round_trip() {
        let source = json!({
            "elements": [{ "id": "e1", "name": "Node", "x": 12.5, "style": { "shape": "box" } }]
        });
        let data: ModelData = serde_json::from_value(source).unwrap();
        assert_eq!(data.elements[0].extra["x"], json!(12.5));

        let encoded = serde_json::to_value(&data).unwrap();
        assert_eq!(encoded["elements"][0]["style"]["shape"], json!("box"));
    }
}
