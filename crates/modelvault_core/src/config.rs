//! Engine configuration.
//!
//! # Invariants
//! - Every field has a default; an empty or missing file yields defaults.
//! - `log_level` is validated at load time with the same rules as
//!   `init_logging`.

use crate::logging::{default_log_level, normalize_level};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "modelvault-data";
pub const DEFAULT_DATABASE_FILE: &str = "modelvault.sqlite3";
pub const DEFAULT_EXPORT_EXTENSION: &str = "json";
pub const DEFAULT_MODEL_NAME: &str = "Untitled Model";
const LOG_DIR_NAME: &str = "logs";

/// Engine settings, deserializable from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
    pub log_level: String,
    /// Store quota; `None` means unlimited.
    pub max_payload_bytes: Option<u64>,
    pub export_extension: String,
    pub default_model_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            log_level: default_log_level().to_string(),
            max_payload_bytes: None,
            export_extension: DEFAULT_EXPORT_EXTENSION.to_string(),
            default_model_name: DEFAULT_MODEL_NAME.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(ConfigError::Parse)?;
        config.validate()
    }

    /// Loads `path`; a missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(source) => Self::from_toml_str(&source),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: err,
            }),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    fn validate(mut self) -> Result<Self, ConfigError> {
        self.log_level = normalize_level(&self.log_level)
            .map_err(ConfigError::Invalid)?
            .to_string();
        if self.database_file.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "database_file cannot be empty".to_string(),
            ));
        }
        if self.default_model_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_model_name cannot be empty".to_string(),
            ));
        }
        if self.max_payload_bytes == Some(0) {
            return Err(ConfigError::Invalid(
                "max_payload_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig, DEFAULT_DATABASE_FILE};
    use std::path::PathBuf;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.database_file, DEFAULT_DATABASE_FILE);
        assert_eq!(config.max_payload_bytes, None);
    }

    #[test]
    fn parses_overrides_and_normalizes_level() {
        let config = EngineConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/modelvault"
            log_level = "WARNING"
            max_payload_bytes = 5000000
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.max_payload_bytes, Some(5_000_000));
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/modelvault/modelvault.sqlite3")
        );
        assert_eq!(config.log_dir(), PathBuf::from("/var/lib/modelvault/logs"));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("colour = 1"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("log_level = \"loud\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_payload_bytes = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
