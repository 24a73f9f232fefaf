use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepolensError>;

#[derive(Error, Debug)]
pub enum RepolensError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("GitHub error: {0}")]
    GitHub(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Producer error: {0}")]
    Producer(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed cache entry: {0}")]
    MalformedCache(String),

    #[error("Query rejected: {0}")]
    QueryRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod analytics;
pub mod cache;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod github;
pub mod ingest;
