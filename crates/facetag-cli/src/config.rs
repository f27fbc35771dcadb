use facetag_core::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::annotate::DisplayGeometry;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Application settings, read from a TOML file with `FACETAG_*` overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub engine: EngineSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub display: DisplayGeometry,
}

/// Which models the engine runs. Both are required.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Mysql,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: Backend,
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// MySQL connection URL.
    pub url: Option<String>,
    /// Overrides the engine's feature length.
    pub feature_len: Option<usize>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: default_db_path(),
            url: None,
            feature_len: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingSettings {
    /// Minimum similarity for a positive match.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_min_confidence() -> f32 {
    0.6
}

fn default_db_path() -> PathBuf {
    PathBuf::from("faces_feature.db")
}

fn default_threshold() -> f32 {
    0.40
}

impl Settings {
    /// Load the settings file, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_toml(&text)?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;

        tracing::info!(path = %path.display(), backend = ?settings.store.backend, "settings loaded");
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FACETAG_*` overrides from `lookup`. Unparsable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACETAG_DETECTOR_MODEL") {
            self.engine.detector_model = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACETAG_RECOGNIZER_MODEL") {
            self.engine.recognizer_model = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACETAG_DB_PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACETAG_DB_URL") {
            self.store.url = Some(v);
        }
        if let Some(v) = lookup("FACETAG_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.matching.threshold = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("matching.threshold", self.matching.threshold)?;
        check_unit("engine.min_confidence", self.engine.min_confidence)?;

        if self.store.backend == Backend::Mysql && self.store.url.is_none() {
            return Err(ConfigError::Invalid(
                "store.url is required when store.backend = \"mysql\"".into(),
            ));
        }
        if self.store.feature_len == Some(0) {
            return Err(ConfigError::Invalid("store.feature_len must be positive".into()));
        }
        if self.display.height <= self.display.reserved_height || self.display.width < 2 {
            return Err(ConfigError::Invalid(format!(
                "display {}x{} leaves no room for a preview (reserved height {})",
                self.display.width, self.display.height, self.display.reserved_height
            )));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            detector_model: self.engine.detector_model.clone(),
            recognizer_model: self.engine.recognizer_model.clone(),
            min_confidence: self.engine.min_confidence,
        }
    }
}

fn check_unit(key: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{key} must be within [0, 1], got {value}")))
    }
}
