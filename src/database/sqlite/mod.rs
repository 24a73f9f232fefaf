use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    Artifact, IssueBatch, IssueRecord, RepoSnapshot, ScopedQueryOutcome,
};
use crate::database::sqlite::queries::{
    ArtifactQueries, IssueBatchQueries, IssueQueries, SnapshotQueries,
};


pub mod models;
pub mod queries;
pub mod scoped;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("repolens.db");
        let db_url = db_path.to_string_lossy();

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(db_url.as_ref()).await
    }

    // Repository snapshot operations
    pub async fn upsert_snapshot(&self, repo_name: &str, repo_info: &Value) -> Result<()> {
        SnapshotQueries::upsert(&self.pool, repo_name, repo_info).await
    }

    pub async fn get_snapshot(&self, repo_name: &str) -> Result<Option<RepoSnapshot>> {
        SnapshotQueries::get(&self.pool, repo_name).await
    }

    // Issue batch operations
    pub async fn upsert_issue_batch(&self, repo_name: &str, issues_data: &Value) -> Result<()> {
        IssueBatchQueries::upsert(&self.pool, repo_name, issues_data).await
    }

    pub async fn get_issue_batch(&self, repo_name: &str) -> Result<Option<IssueBatch>> {
        IssueBatchQueries::get(&self.pool, repo_name).await
    }

    // Artifact operations
    pub async fn upsert_artifact(
        &self,
        repo_name: &str,
        artifact_type: &str,
        data: &Value,
    ) -> Result<()> {
        ArtifactQueries::upsert(&self.pool, repo_name, artifact_type, data).await
    }

    pub async fn get_artifact(
        &self,
        repo_name: &str,
        artifact_type: &str,
    ) -> Result<Option<Artifact>> {
        ArtifactQueries::get(&self.pool, repo_name, artifact_type).await
    }

    // Individual issue operations
    pub async fn insert_issue(&self, issue: &IssueRecord) -> Result<()> {
        IssueQueries::insert(&self.pool, issue).await
    }

    pub async fn issue_exists(&self, repo_name: &str, issue_number: i64) -> Result<bool> {
        IssueQueries::exists(&self.pool, repo_name, issue_number).await
    }

    pub async fn count_issues(&self, repo_name: &str) -> Result<i64> {
        IssueQueries::count_for_repo(&self.pool, repo_name).await
    }

    pub async fn get_issues_by_ids(
        &self,
        repo_name: &str,
        ids: &[i64],
    ) -> Result<Vec<IssueRecord>> {
        IssueQueries::get_by_ids_for_repo(&self.pool, repo_name, ids).await
    }

    pub async fn scoped_query(
        &self,
        repo_name: &str,
        query: &str,
    ) -> crate::Result<ScopedQueryOutcome> {
        scoped::execute_scoped_query(&self.pool, repo_name, query).await
    }

    /// Drop every cached row for one repository in a single transaction.
    /// Returns the ids of the deleted issues so the caller can also remove
    /// their vectors.
    pub async fn clear_repository(&self, repo_name: &str) -> Result<Vec<i64>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin clear transaction")?;

        let issue_ids: Vec<i64> = sqlx::query("SELECT id FROM issues WHERE repo_name = ?")
            .bind(repo_name)
            .fetch_all(&mut *tx)
            .await
            .context("Failed to collect issue ids for clear")?
            .into_iter()
            .map(|row| row.get("id"))
            .collect();

        for table in ["repository_data", "repository_issues", "visualization_cache", "issues"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE repo_name = ?"))
                .bind(repo_name)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to clear {table}"))?;
        }

        tx.commit()
            .await
            .context("Failed to commit clear transaction")?;

        info!(
            "Cleared cache for {} ({} issues removed)",
            repo_name,
            issue_ids.len()
        );
        Ok(issue_ids)
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}
