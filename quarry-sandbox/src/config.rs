//! Sandbox configuration
//!
//! Loaded from TOML; durations use human-readable strings such as `"30s"` or
//! `"500ms"`.

use crate::error::{Result, SandboxError};
use crate::limits::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for a [`crate::SandboxService`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Per-context resource limits
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Transpiler settings
    #[serde(default)]
    pub transpile: TranspileConfig,
}

/// Source dialect accepted from users
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    #[default]
    TypeScript,
    JavaScript,
}

/// Transpiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranspileConfig {
    #[serde(default)]
    pub language: SourceLanguage,
    /// Module specifier the source is parsed under; appears in diagnostics
    #[serde(default = "TranspileConfig::default_specifier")]
    pub specifier: String,
}

impl Default for TranspileConfig {
    fn default() -> Self {
        Self {
            language: SourceLanguage::default(),
            specifier: Self::default_specifier(),
        }
    }
}

impl TranspileConfig {
    fn default_specifier() -> String {
        "file:///user-code.ts".to_string()
    }
}

impl SandboxConfig {
    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SandboxError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).inspect_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read sandbox config");
        })?;

        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded sandbox config");
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SandboxError::Config(format!("Failed to serialize config: {}", e)))
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_language(mut self, language: SourceLanguage) -> Self {
        self.transpile.language = language;
        self
    }
}
