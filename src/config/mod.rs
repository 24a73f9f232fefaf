// Configuration management module
// Handles the TOML configuration file and credential resolution

pub mod settings;

pub use settings::{
    AtlasConfig, CacheConfig, Config, ConfigError, EmbeddingConfig, GithubConfig,
};
