use super::models::*;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::warn;

/// Decode a JSON column, treating malformed content as a cache miss.
///
/// Older deployments wrote doubly-encoded payloads (a JSON string whose
/// content is itself JSON). Unwrap one level of that before giving up.
fn decode_cached_json(table: &str, repo_name: &str, raw: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(value) => {
                warn!(
                    "Repaired doubly-encoded cache entry in {} for {}",
                    table, repo_name
                );
                Some(value)
            }
            Err(err) => {
                warn!(
                    "Discarding malformed cache entry in {} for {}: {}",
                    table, repo_name, err
                );
                None
            }
        },
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                "Discarding malformed cache entry in {} for {}: {}",
                table, repo_name, err
            );
            None
        }
    }
}

pub struct SnapshotQueries;

impl SnapshotQueries {
    #[inline]
    pub async fn upsert(pool: &SqlitePool, repo_name: &str, repo_info: &Value) -> Result<()> {
        let serialized =
            serde_json::to_string(repo_info).context("Failed to serialize repository info")?;

        sqlx::query(
            r#"
            INSERT INTO repository_data (repo_name, repo_info, last_updated)
            VALUES (?, ?, ?)
            ON CONFLICT(repo_name) DO UPDATE SET
                repo_info = excluded.repo_info,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(repo_name)
        .bind(serialized)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to upsert repository snapshot")?;

        Ok(())
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, repo_name: &str) -> Result<Option<RepoSnapshot>> {
        let row = sqlx::query(
            "SELECT repo_name, repo_info, last_updated FROM repository_data WHERE repo_name = ?",
        )
        .bind(repo_name)
        .fetch_optional(pool)
        .await
        .context("Failed to get repository snapshot")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.get("repo_info");
        let Some(repo_info) = decode_cached_json("repository_data", repo_name, &raw) else {
            return Ok(None);
        };

        Ok(Some(RepoSnapshot {
            repo_name: row.get("repo_name"),
            repo_info,
            last_updated: row.get::<DateTime<Utc>, _>("last_updated"),
        }))
    }
}

pub struct IssueBatchQueries;

impl IssueBatchQueries {
    #[inline]
    pub async fn upsert(pool: &SqlitePool, repo_name: &str, issues_data: &Value) -> Result<()> {
        let serialized =
            serde_json::to_string(issues_data).context("Failed to serialize issue batch")?;

        sqlx::query(
            r#"
            INSERT INTO repository_issues (repo_name, issues_data, last_updated)
            VALUES (?, ?, ?)
            ON CONFLICT(repo_name) DO UPDATE SET
                issues_data = excluded.issues_data,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(repo_name)
        .bind(serialized)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to upsert issue batch")?;

        Ok(())
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, repo_name: &str) -> Result<Option<IssueBatch>> {
        let row = sqlx::query(
            "SELECT repo_name, issues_data, last_updated FROM repository_issues WHERE repo_name = ?",
        )
        .bind(repo_name)
        .fetch_optional(pool)
        .await
        .context("Failed to get issue batch")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.get("issues_data");
        let Some(issues_data) = decode_cached_json("repository_issues", repo_name, &raw) else {
            return Ok(None);
        };

        Ok(Some(IssueBatch {
            repo_name: row.get("repo_name"),
            issues_data,
            last_updated: row.get::<DateTime<Utc>, _>("last_updated"),
        }))
    }
}

pub struct ArtifactQueries;

impl ArtifactQueries {
    #[inline]
    pub async fn upsert(
        pool: &SqlitePool,
        repo_name: &str,
        artifact_type: &str,
        data: &Value,
    ) -> Result<()> {
        let serialized = serde_json::to_string(data).context("Failed to serialize artifact")?;

        sqlx::query(
            r#"
            INSERT INTO visualization_cache (repo_name, artifact_type, data, last_updated)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(repo_name, artifact_type) DO UPDATE SET
                data = excluded.data,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(repo_name)
        .bind(artifact_type)
        .bind(serialized)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to upsert artifact")?;

        Ok(())
    }

    #[inline]
    pub async fn get(
        pool: &SqlitePool,
        repo_name: &str,
        artifact_type: &str,
    ) -> Result<Option<Artifact>> {
        let row = sqlx::query(
            r#"
            SELECT repo_name, artifact_type, data, last_updated
            FROM visualization_cache
            WHERE repo_name = ? AND artifact_type = ?
            "#,
        )
        .bind(repo_name)
        .bind(artifact_type)
        .fetch_optional(pool)
        .await
        .context("Failed to get artifact")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.get("data");
        let Some(data) = decode_cached_json("visualization_cache", repo_name, &raw) else {
            return Ok(None);
        };

        Ok(Some(Artifact {
            repo_name: row.get("repo_name"),
            artifact_type: row.get("artifact_type"),
            data,
            last_updated: row.get::<DateTime<Utc>, _>("last_updated"),
        }))
    }
}

pub struct IssueQueries;

impl IssueQueries {
    /// Insert-if-absent: an existing (repo_name, issue_number) row is left
    /// untouched. Refreshing an issue means clearing and re-indexing.
    #[inline]
    pub async fn insert(pool: &SqlitePool, issue: &IssueRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO issues (id, repo_name, issue_number, title, body, state,
                                author, created_at, updated_at, labels)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(issue.id)
        .bind(&issue.repo_name)
        .bind(issue.issue_number)
        .bind(&issue.title)
        .bind(&issue.body)
        .bind(&issue.state)
        .bind(&issue.author)
        .bind(&issue.created_at)
        .bind(&issue.updated_at)
        .bind(&issue.labels)
        .execute(pool)
        .await
        .context("Failed to insert issue")?;

        Ok(())
    }

    #[inline]
    pub async fn exists(pool: &SqlitePool, repo_name: &str, issue_number: i64) -> Result<bool> {
        let row =
            sqlx::query("SELECT 1 FROM issues WHERE repo_name = ? AND issue_number = ? LIMIT 1")
                .bind(repo_name)
                .bind(issue_number)
                .fetch_optional(pool)
                .await
                .context("Failed to check issue existence")?;

        Ok(row.is_some())
    }

    #[inline]
    pub async fn count_for_repo(pool: &SqlitePool, repo_name: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM issues WHERE repo_name = ?")
            .bind(repo_name)
            .fetch_one(pool)
            .await
            .context("Failed to count issues")?;

        Ok(row.get("n"))
    }

    /// Fetch records for the given ids, restricted to one repository.
    /// Ids belonging to other repositories are silently absent from the
    /// result, which is what similarity search relies on for isolation.
    #[inline]
    pub async fn get_by_ids_for_repo(
        pool: &SqlitePool,
        repo_name: &str,
        ids: &[i64],
    ) -> Result<Vec<IssueRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT id, repo_name, issue_number, title, body, state,
                   author, created_at, updated_at, labels
            FROM issues
            WHERE repo_name = ? AND id IN ({placeholders})
            "#
        );

        let mut query = sqlx::query(&sql).bind(repo_name);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(pool)
            .await
            .context("Failed to get issues by ids")?;

        Ok(rows
            .into_iter()
            .map(|row| IssueRecord {
                id: row.get("id"),
                repo_name: row.get("repo_name"),
                issue_number: row.get("issue_number"),
                title: row.get("title"),
                body: row.get("body"),
                state: row.get("state"),
                author: row.get("author"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
                labels: row.get::<Option<String>, _>("labels").unwrap_or_default(),
            })
            .collect())
    }
}
