//! Configuration
//!
//! One immutable [`Config`] struct, constructed once at startup and passed by
//! reference into the pipeline components; thresholds never live in hidden
//! statics. Loading merges three layers through Figment: built-in defaults,
//! an optional TOML file, and `DOCLOOM_*` environment variables.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::generation::{GenerationConfig, OrchestratorConfig};
use crate::quality::QualityConfig;
use crate::synthesis::SynthesisConfig;
use crate::types::{DocError, Result};

/// Top-level configuration for a pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub quality: QualityConfig,
    pub generation: GenerationConfig,
    pub orchestrator: OrchestratorConfig,
    pub synthesis: SynthesisConfig,
    pub storage: StorageConfig,
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path, relative to the working directory
    pub database_path: String,
    /// Connection pool size
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "docloom.db".to_string(),
            pool_size: 8,
        }
    }
}

impl Config {
    /// Check cross-field invariants the type system cannot express
    pub fn validate(&self) -> Result<()> {
        if self.quality.min_length == 0 {
            return Err(DocError::Config("quality.min_length must be > 0".into()));
        }
        if self.quality.borderline_factor < 1.0 {
            return Err(DocError::Config(
                "quality.borderline_factor must be >= 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality.min_native_ratio) {
            return Err(DocError::Config(
                "quality.min_native_ratio must be within [0, 1]".into(),
            ));
        }
        if self.quality.native_script_start > self.quality.native_script_end {
            return Err(DocError::Config(
                "quality.native_script_start must not exceed native_script_end".into(),
            ));
        }
        if self.orchestrator.concurrency == 0 {
            return Err(DocError::Config(
                "orchestrator.concurrency must be > 0".into(),
            ));
        }
        if self.generation.max_outer_retries == 0 {
            return Err(DocError::Config(
                "generation.max_outer_retries must be > 0".into(),
            ));
        }
        if self.synthesis.max_attempts == 0 {
            return Err(DocError::Config("synthesis.max_attempts must be > 0".into()));
        }
        if self.storage.pool_size == 0 {
            return Err(DocError::Config("storage.pool_size must be > 0".into()));
        }
        Ok(())
    }

    /// Defaults → optional TOML file → `DOCLOOM_*` environment variables
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = file {
            debug!("loading config from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("DOCLOOM_").split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| DocError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DocError::Config(e.to_string()))
    }
}
