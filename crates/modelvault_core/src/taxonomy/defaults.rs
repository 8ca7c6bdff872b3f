//! Built-in taxonomy schemes shipped with this build.

use crate::model::taxonomy::{RelationshipType, TaxonomyScheme};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

struct TagSeed {
    tag: &'static str,
    color: &'static str,
    description: &'static str,
}

struct SchemeSeed {
    id: &'static str,
    name: &'static str,
    tags: &'static [TagSeed],
    relationships: &'static [(&'static str, &'static str)],
}

const SCHEME_SEEDS: &[SchemeSeed] = &[
    SchemeSeed {
        id: "default",
        name: "Knowledge Graph",
        tags: &[
            TagSeed {
                tag: "concept",
                color: "#4f86f7",
                description: "An abstract idea or notion.",
            },
            TagSeed {
                tag: "person",
                color: "#f28c28",
                description: "An individual or persona.",
            },
            TagSeed {
                tag: "organization",
                color: "#8e44ad",
                description: "A company, team or institution.",
            },
            TagSeed {
                tag: "event",
                color: "#e74c3c",
                description: "Something that happens at a point in time.",
            },
            TagSeed {
                tag: "resource",
                color: "#27ae60",
                description: "A document, tool or artifact.",
            },
            TagSeed {
                tag: "question",
                color: "#f1c40f",
                description: "An open question to investigate.",
            },
        ],
        relationships: &[
            ("relates to", "A general association between two elements."),
            ("part of", "The source is a component of the target."),
            ("depends on", "The source requires the target."),
            ("causes", "The source leads to the target."),
            ("contradicts", "The source conflicts with the target."),
            ("supports", "The source provides evidence for the target."),
        ],
    },
    SchemeSeed {
        id: "systems",
        name: "Systems Thinking",
        tags: &[
            TagSeed {
                tag: "stock",
                color: "#2e86c1",
                description: "An accumulation that changes over time.",
            },
            TagSeed {
                tag: "flow",
                color: "#48c9b0",
                description: "A rate that fills or drains a stock.",
            },
            TagSeed {
                tag: "variable",
                color: "#af7ac5",
                description: "A quantity that influences the system.",
            },
            TagSeed {
                tag: "loop",
                color: "#eb984e",
                description: "A feedback loop.",
            },
        ],
        relationships: &[
            ("increases", "A rise in the source raises the target."),
            ("decreases", "A rise in the source lowers the target."),
            ("feeds", "The source flows into the target."),
            ("delays", "The source affects the target after a delay."),
        ],
    },
    SchemeSeed {
        id: "argument",
        name: "Argument Map",
        tags: &[
            TagSeed {
                tag: "claim",
                color: "#3498db",
                description: "A statement put forward as true.",
            },
            TagSeed {
                tag: "evidence",
                color: "#2ecc71",
                description: "Data or observation backing a claim.",
            },
            TagSeed {
                tag: "objection",
                color: "#e74c3c",
                description: "A reason to doubt a claim.",
            },
            TagSeed {
                tag: "assumption",
                color: "#95a5a6",
                description: "An unstated premise.",
            },
        ],
        relationships: &[
            ("supports", "The source strengthens the target."),
            ("rebuts", "The source weakens the target."),
            ("assumes", "The source relies on the target."),
        ],
    },
];

static BUILTIN_SCHEMES: Lazy<Vec<TaxonomyScheme>> =
    Lazy::new(|| SCHEME_SEEDS.iter().map(build_scheme).collect());

/// Built-in schemes in catalog order.
pub fn builtin_schemes() -> &'static [TaxonomyScheme] {
    BUILTIN_SCHEMES.as_slice()
}

/// Built-in scheme by id.
pub fn builtin_scheme(id: &str) -> Option<&'static TaxonomyScheme> {
    builtin_schemes().iter().find(|scheme| scheme.id == id)
}

fn build_scheme(seed: &SchemeSeed) -> TaxonomyScheme {
    let tag_colors: BTreeMap<String, String> = seed
        .tags
        .iter()
        .map(|tag| (tag.tag.to_string(), tag.color.to_string()))
        .collect();
    let tag_descriptions: BTreeMap<String, String> = seed
        .tags
        .iter()
        .map(|tag| (tag.tag.to_string(), tag.description.to_string()))
        .collect();
    let definitions = seed
        .relationships
        .iter()
        .map(|(label, description)| RelationshipType::new(*label, *description))
        .collect();

    TaxonomyScheme {
        id: seed.id.to_string(),
        name: seed.name.to_string(),
        tag_colors,
        tag_descriptions,
        relationship_definitions: Some(definitions),
        relationship_labels: None,
    }
}

#[cfg(test)]
mod tests {
    use super::{builtin_scheme, builtin_schemes};
    use std::collections::BTreeSet;

    #[test]
    fn builtin_ids_are_unique() {
        let ids: BTreeSet<&str> = builtin_schemes()
            .iter()
            .map(|scheme| scheme.id.as_str())
            .collect();
        assert_eq!(ids.len(), builtin_schemes().len());
    }

    #[test]
    fn every_builtin_tag_has_color_and_description() {
        for scheme in builtin_schemes() {
            assert!(!scheme.tag_colors.is_empty());
            for tag in scheme.tag_colors.keys() {
                assert!(scheme.tag_descriptions.contains_key(tag), "{tag}");
            }
            assert!(!scheme.uses_legacy_catalog());
        }
    }

    #[test]
    fn looks_up_scheme_by_id() {
        assert_eq!(builtin_scheme("systems").unwrap().name, "Systems Thinking");
        assert!(builtin_scheme("missing").is_none());
    }
}
