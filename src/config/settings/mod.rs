#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const EMBEDDING_DIMENSION: u32 = 1536;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub atlas: AtlasConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: Url,
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("https://api.github.com")
                .expect("default GitHub API URL is valid"),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_url: Url,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("https://api.openai.com")
                .expect("default embedding API URL is valid"),
            api_key: None,
            model: "text-embedding-ada-002".to_string(),
            dimension: EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AtlasConfig {
    pub api_url: Url,
    pub api_key: Option<String>,
    pub poll_interval_secs: u64,
    pub max_polls: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("https://api-atlas.nomic.ai")
                .expect("default Atlas API URL is valid"),
            api_key: None,
            poll_interval_secs: 5,
            max_polls: 3,
        }
    }
}

/// Freshness windows, in hours. See `cache::freshness` for how each is applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub default_max_age_hours: i64,
    pub topic_max_age_hours: i64,
    pub processing_grace_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_max_age_hours: 24,
            topic_max_age_hours: 168,
            processing_grace_hours: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid embedding model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid freshness window: {0} hours (must be positive)")]
    InvalidFreshnessWindow(i64),
    #[error("Invalid poll settings: interval {0}s, max polls {1}")]
    InvalidPollSettings(u64, u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Config::default()
        };
        config.base_dir = config_dir.as_ref().to_path_buf();
        config.fill_credentials_from_env();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load from the default per-user configuration directory.
    #[inline]
    pub fn load_default() -> Result<Self> {
        let dir = Self::config_dir().context("Failed to resolve config directory")?;
        Self::load(dir)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Unset credentials fall back to the process environment.
    fn fill_credentials_from_env(&mut self) {
        if self.github.token.is_none() {
            self.github.token = std::env::var("GITHUB_TOKEN").ok();
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = std::env::var("EMBEDDING_API_KEY").ok();
        }
        if self.atlas.api_key.is_none() {
            self.atlas.api_key = std::env::var("ATLAS_API_KEY").ok();
        }
    }

    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("repolens"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding.model.clone()));
        }

        if !(64..=4096).contains(&self.embedding.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding.dimension,
            ));
        }

        for hours in [
            self.cache.default_max_age_hours,
            self.cache.topic_max_age_hours,
            self.cache.processing_grace_hours,
        ] {
            if hours <= 0 {
                return Err(ConfigError::InvalidFreshnessWindow(hours));
            }
        }

        if self.atlas.poll_interval_secs == 0 || self.atlas.max_polls == 0 {
            return Err(ConfigError::InvalidPollSettings(
                self.atlas.poll_interval_secs,
                self.atlas.max_polls,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("repolens.db")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.base_dir.join("vectors")
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            github: GithubConfig::default(),
            embedding: EmbeddingConfig::default(),
            atlas: AtlasConfig::default(),
            cache: CacheConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}
