//! Configuration for the attendance engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rollcall_embeddings::matcher::validate_threshold;
use rollcall_embeddings::{
    DEFAULT_DIMENSION, DEFAULT_DUPLICATE_TOLERANCE, DEFAULT_RECOGNITION_THRESHOLD,
};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Configuration for the attendance engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollcallConfig {
    /// Number of components in every face embedding.
    pub dimension: usize,

    /// Best matches strictly below this distance are recognized.
    pub recognition_threshold: f32,

    /// Enrollments within this distance of an enrolled face are rejected.
    pub duplicate_tolerance: f32,

    /// Upper bound on one enrollment transaction, embedder call included.
    pub enrollment_timeout_secs: u64,

    /// Directory for the JSON durable store.
    pub data_dir: PathBuf,

    /// Face embedder configuration.
    pub embedder: EmbedderConfig,
}

impl RollcallConfig {
    /// Create a new configuration with default values.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            recognition_threshold: DEFAULT_RECOGNITION_THRESHOLD,
            duplicate_tolerance: DEFAULT_DUPLICATE_TOLERANCE,
            enrollment_timeout_secs: 30,
            data_dir: data_dir.into(),
            embedder: EmbedderConfig::default(),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Set the recognition threshold.
    pub fn with_recognition_threshold(mut self, threshold: f32) -> Self {
        self.recognition_threshold = threshold;
        self
    }

    /// Set the duplicate tolerance.
    pub fn with_duplicate_tolerance(mut self, tolerance: f32) -> Self {
        self.duplicate_tolerance = tolerance;
        self
    }

    /// Set the enrollment timeout.
    pub fn with_enrollment_timeout(mut self, timeout: Duration) -> Self {
        self.enrollment_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the embedder configuration.
    pub fn with_embedder(mut self, embedder: EmbedderConfig) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn enrollment_timeout(&self) -> Duration {
        Duration::from_secs(self.enrollment_timeout_secs)
    }

    /// Check the values before an engine is built from them.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(EngineError::Config(
                "dimension must be positive".to_string(),
            ));
        }
        if self.enrollment_timeout_secs == 0 {
            return Err(EngineError::Config(
                "enrollment_timeout_secs must be positive".to_string(),
            ));
        }
        validate_threshold(self.recognition_threshold)?;
        validate_threshold(self.duplicate_tolerance)?;
        match &self.embedder {
            EmbedderConfig::Http { url, .. } if url.trim().is_empty() => Err(EngineError::Config(
                "http embedder needs a url".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl Default for RollcallConfig {
    fn default() -> Self {
        Self::new(dirs::data_dir().unwrap_or_default().join("rollcall"))
    }
}

/// Which face embedder to use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedderConfig {
    /// Uploads already carry their embeddings as JSON.
    #[default]
    Json,
    /// Remote face embedding service.
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
}
