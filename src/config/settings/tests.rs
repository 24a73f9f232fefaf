use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config_is_valid() {
    let config = Config::default();
    config.validate().expect("default config should validate");

    assert_eq!(config.embedding.dimension, EMBEDDING_DIMENSION);
    assert_eq!(config.cache.default_max_age_hours, 24);
    assert_eq!(config.cache.topic_max_age_hours, 168);
    assert_eq!(config.cache.processing_grace_hours, 1);
}

#[test]
fn load_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = Config::load(temp_dir.path()).expect("Failed to load config");

    assert_eq!(config.github.api_url.as_str(), "https://api.github.com/");
    assert_eq!(config.base_dir, temp_dir.path());
}

#[test]
fn save_and_reload_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let mut config = Config::load(temp_dir.path()).expect("Failed to load config");
    config.cache.default_max_age_hours = 48;
    config.embedding.model = "custom-embedding-model".to_string();
    config.save().expect("Failed to save config");

    let reloaded = Config::load(temp_dir.path()).expect("Failed to reload config");
    assert_eq!(reloaded.cache.default_max_age_hours, 48);
    assert_eq!(reloaded.embedding.model, "custom-embedding-model");
}

#[test]
fn rejects_invalid_embedding_dimension() {
    let mut config = Config::default();
    config.embedding.dimension = 10;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidEmbeddingDimension(10))
    ));
}

#[test]
fn rejects_non_positive_freshness_window() {
    let mut config = Config::default();
    config.cache.processing_grace_hours = 0;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidFreshnessWindow(0))
    ));
}

#[test]
fn rejects_empty_model_name() {
    let mut config = Config::default();
    config.embedding.model = "  ".to_string();

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidModel(_))
    ));
}

#[test]
#[serial]
fn credentials_fall_back_to_environment() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    // SAFETY: the serial attribute keeps other env-mutating tests off this
    // process while the variable is set.
    unsafe { std::env::set_var("GITHUB_TOKEN", "env-token") };
    let config = Config::load(temp_dir.path()).expect("Failed to load config");
    // SAFETY: same serialization as above.
    unsafe { std::env::remove_var("GITHUB_TOKEN") };

    assert_eq!(config.github.token.as_deref(), Some("env-token"));
}

#[test]
#[serial]
fn file_credentials_win_over_environment() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[github]\ntoken = \"file-token\"\n",
    )
    .expect("Failed to write config file");

    // SAFETY: the serial attribute keeps other env-mutating tests off this
    // process while the variable is set.
    unsafe { std::env::set_var("GITHUB_TOKEN", "env-token") };
    let config = Config::load(temp_dir.path()).expect("Failed to load config");
    // SAFETY: same serialization as above.
    unsafe { std::env::remove_var("GITHUB_TOKEN") };

    assert_eq!(config.github.token.as_deref(), Some("file-token"));
}

#[test]
fn database_paths_derive_from_base_dir() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = Config::load(temp_dir.path()).expect("Failed to load config");

    assert_eq!(config.database_path(), temp_dir.path().join("repolens.db"));
    assert_eq!(
        config.vector_database_path(),
        temp_dir.path().join("vectors")
    );
}
