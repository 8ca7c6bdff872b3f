//! Canonical export shape `{metadata, data}`.

use super::data::ModelData;
use super::metadata::ModelMetadata;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static UNSAFE_FILENAME_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]+"#).expect("valid filename regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

const FALLBACK_FILE_STEM: &str = "model";

/// Exported file content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEnvelope {
    pub metadata: ModelMetadata,
    pub data: ModelData,
}

impl ModelEnvelope {
    /// Pretty-printed JSON bytes as written to external files.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// Derives a file name from a model name, e.g. `My Model` -> `My-Model.json`.
pub fn suggested_filename(model_name: &str, extension: &str) -> String {
    let stripped = UNSAFE_FILENAME_CHARS_RE.replace_all(model_name.trim(), "");
    let stem = WHITESPACE_RE.replace_all(stripped.trim(), "-");
    let stem = stem.trim_matches('.');
    let stem = if stem.is_empty() { FALLBACK_FILE_STEM } else { stem };
    let extension = extension.trim().trim_start_matches('.');
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}
