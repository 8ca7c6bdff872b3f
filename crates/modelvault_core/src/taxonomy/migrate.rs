//! Additive taxonomy migration against the built-in catalog.
//!
//! Per loaded scheme, matched by id against the built-in catalog:
//! 1. legacy `relationshipLabels` become structured definitions,
//! 2. missing built-in tags are added with built-in colors/descriptions,
//! 3. missing built-in relationship types are added.
//!
//! Built-in schemes missing from the loaded set are then appended whole.
//! Existing tags, colors, descriptions and relationship types are never
//! touched or removed.

use crate::model::data::ModelData;
use crate::model::taxonomy::{RelationshipType, TaxonomyScheme};
use log::info;
use std::collections::BTreeSet;

/// Migrated scheme set plus a human-readable change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub schemes: Vec<TaxonomyScheme>,
    /// Empty when nothing changed.
    pub changes: Vec<String>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Migrates a possibly-legacy scheme set against `defaults`.
///
/// Total over any deserializable scheme set; never fails.
pub fn migrate_schemes(loaded: Vec<TaxonomyScheme>, defaults: &[TaxonomyScheme]) -> MigrationReport {
    let mut changes = Vec::new();
    let mut schemes = Vec::with_capacity(loaded.len().max(defaults.len()));

    for mut scheme in loaded {
        let default = defaults.iter().find(|candidate| candidate.id == scheme.id);

        if let Some(converted) = convert_legacy_labels(&mut scheme, default, defaults) {
            changes.push(format!(
                "Converted {converted} relationship label(s) to definitions in scheme '{}'",
                display_name(&scheme)
            ));
        }

        if let Some(default) = default {
            let added_tags = union_default_tags(&mut scheme, default);
            if !added_tags.is_empty() {
                changes.push(format!(
                    "Added tags to scheme '{}': {}",
                    display_name(&scheme),
                    added_tags.join(", ")
                ));
            }

            let added_types = union_default_relationship_types(&mut scheme, default);
            if !added_types.is_empty() {
                changes.push(format!(
                    "Added relationship types to scheme '{}': {}",
                    display_name(&scheme),
                    added_types.join(", ")
                ));
            }
        }

        schemes.push(scheme);
    }

    let present: BTreeSet<String> = schemes.iter().map(|scheme| scheme.id.clone()).collect();
    let missing: Vec<&TaxonomyScheme> = defaults
        .iter()
        .filter(|default| !present.contains(&default.id))
        .collect();
    if !missing.is_empty() {
        changes.push(format!(
            "Added schemes: {}",
            missing
                .iter()
                .map(|scheme| display_name(scheme))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        schemes.extend(missing.into_iter().cloned());
    }

    if !changes.is_empty() {
        info!(
            "event=taxonomy_migrate module=taxonomy status=ok schemes={} changes={}",
            schemes.len(),
            changes.len()
        );
    }

    MigrationReport { schemes, changes }
}

/// Migrates the taxonomy of a whole payload in place and returns the
/// change log.
///
/// Also selects the first scheme as active when no valid selection exists.
pub fn migrate_model_taxonomy(data: &mut ModelData, defaults: &[TaxonomyScheme]) -> Vec<String> {
    let report = migrate_schemes(std::mem::take(&mut data.schemes), defaults);
    data.schemes = report.schemes;
    let mut changes = report.changes;

    let active_is_valid = data
        .active_scheme_id
        .as_deref()
        .is_some_and(|id| data.schemes.iter().any(|scheme| scheme.id == id));
    if !active_is_valid {
        if let Some(first) = data.schemes.first() {
            changes.push(format!("Selected scheme '{}' as active", display_name(first)));
            data.active_scheme_id = Some(first.id.clone());
        }
    }

    changes
}

/// Returns the number of labels converted, or `None` for non-legacy schemes.
fn convert_legacy_labels(
    scheme: &mut TaxonomyScheme,
    default: Option<&TaxonomyScheme>,
    defaults: &[TaxonomyScheme],
) -> Option<usize> {
    let labels = scheme.relationship_labels.take()?;
    let mut definitions = scheme.relationship_definitions.take().unwrap_or_default();
    let mut converted = 0;

    for label in labels {
        if definitions.iter().any(|entry| entry.label == label) {
            continue;
        }
        let description = default
            .into_iter()
            .chain(defaults.iter())
            .flat_map(|candidate| candidate.definitions().iter())
            .find(|entry| entry.label == label)
            .map(|entry| entry.description.clone())
            .unwrap_or_default();
        definitions.push(RelationshipType { label, description });
        converted += 1;
    }

    scheme.relationship_definitions = Some(definitions);
    Some(converted)
}

fn union_default_tags(scheme: &mut TaxonomyScheme, default: &TaxonomyScheme) -> Vec<String> {
    let mut added = Vec::new();
    for (tag, color) in &default.tag_colors {
        if scheme.tag_colors.contains_key(tag) {
            continue;
        }
        scheme.tag_colors.insert(tag.clone(), color.clone());
        if let Some(description) = default.tag_descriptions.get(tag) {
            scheme
                .tag_descriptions
                .entry(tag.clone())
                .or_insert_with(|| description.clone());
        }
        added.push(tag.clone());
    }
    added
}

fn union_default_relationship_types(
    scheme: &mut TaxonomyScheme,
    default: &TaxonomyScheme,
) -> Vec<String> {
    let missing: Vec<RelationshipType> = default
        .definitions()
        .iter()
        .filter(|entry| !scheme.has_relationship_label(&entry.label))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Vec::new();
    }

    let added = missing.iter().map(|entry| entry.label.clone()).collect();
    scheme
        .relationship_definitions
        .get_or_insert_with(Vec::new)
        .extend(missing);
    added
}

fn display_name(scheme: &TaxonomyScheme) -> &str {
    if scheme.name.is_empty() {
        &scheme.id
    } else {
        &scheme.name
    }
}
