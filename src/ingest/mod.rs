//! Issue indexing pipeline: normalize an issue batch, persist new issues
//! in SQLite, and embed them into the vector store for similarity search.


pub mod normalize;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::database::lancedb::IssueEmbeddingRecord;
use crate::database::lancedb::vector_store::VectorStore;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::IssueRecord;
use crate::embeddings::EmbeddingClient;
use crate::{RepolensError, Result};

/// Search candidates are over-fetched before the repository join because
/// the vector table mixes every repository together.
const OVERSAMPLE_FACTOR: usize = 16;
const MIN_CANDIDATES: usize = 256;

pub struct IssueIndexer<'a> {
    database: &'a Database,
    vector_store: &'a VectorStore,
    embeddings: &'a EmbeddingClient,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndexOutcome {
    /// Issues newly inserted into the store.
    pub inserted: usize,
    /// Issues whose vector was stored.
    pub embedded: usize,
    /// Issues skipped: already indexed, empty text, or a failed embedding.
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarIssue {
    #[serde(flatten)]
    pub issue: IssueRecord,
    pub distance: f32,
    pub similarity: f32,
}

impl<'a> IssueIndexer<'a> {
    #[inline]
    pub fn new(
        database: &'a Database,
        vector_store: &'a VectorStore,
        embeddings: &'a EmbeddingClient,
    ) -> Self {
        Self {
            database,
            vector_store,
            embeddings,
        }
    }

    /// Index an issue batch for one repository. Issues already present for
    /// the same (repository, number) are left alone, so re-running over an
    /// unchanged batch is a no-op. Per-issue embedding problems skip that
    /// issue without aborting the batch.
    #[inline]
    pub async fn index_repository(&self, repo_name: &str, batch: &Value) -> Result<IndexOutcome> {
        let issues = normalize::normalize_batch(batch)?;
        let mut outcome = IndexOutcome::default();
        let mut vector_records = Vec::new();

        for issue in &issues {
            if self
                .database
                .issue_exists(repo_name, issue.number)
                .await
                .context("Failed to check issue existence")?
            {
                outcome.skipped += 1;
                continue;
            }

            self.database
                .insert_issue(&issue.to_record(repo_name))
                .await
                .with_context(|| format!("Failed to persist issue #{}", issue.number))?;
            outcome.inserted += 1;

            let text = issue.embedding_text();
            if text.trim().is_empty() {
                debug!(
                    "Skipping embedding for issue #{} with empty text",
                    issue.number
                );
                outcome.skipped += 1;
                continue;
            }

            match self.embeddings.embed(&text) {
                Ok(vector) => {
                    vector_records.push(IssueEmbeddingRecord {
                        issue_id: issue.id,
                        vector,
                    });
                    outcome.embedded += 1;
                }
                Err(err) => {
                    warn!("Failed to embed issue #{}: {:#}", issue.number, err);
                    outcome.skipped += 1;
                }
            }
        }

        self.vector_store
            .store_batch(&vector_records)
            .await
            .map_err(|e| RepolensError::Embedding(format!("Failed to store vectors: {e}")))?;

        info!(
            "Indexed {} for {}: {} inserted, {} embedded, {} skipped",
            issues.len(),
            repo_name,
            outcome.inserted,
            outcome.embedded,
            outcome.skipped
        );
        Ok(outcome)
    }

    /// Find the issues in one repository most similar to a free-text query.
    ///
    /// The vector search runs over all repositories; candidate ids are then
    /// joined against the repository-filtered `issues` table, so results
    /// never include another repository's issues.
    #[inline]
    pub async fn similarity_search(
        &self,
        repo_name: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarIssue>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embeddings
            .embed(query)
            .context("Failed to embed search query")?;

        let candidates = top_k.saturating_mul(OVERSAMPLE_FACTOR).max(MIN_CANDIDATES);
        let hits = self.vector_store.search(&query_vector, candidates).await?;

        debug!(
            "Vector search returned {} candidates for top_k={}",
            hits.len(),
            top_k
        );

        let ids: Vec<i64> = hits.iter().map(|hit| hit.issue_id).collect();
        let records = self
            .database
            .get_issues_by_ids(repo_name, &ids)
            .await
            .context("Failed to join search hits against issues")?;

        // Preserve ascending-distance order from the vector search.
        let mut results = Vec::with_capacity(top_k);
        for hit in hits {
            if let Some(record) = records.iter().find(|r| r.id == hit.issue_id) {
                // L2 distances can exceed 1.0; keep similarity non-negative.
                results.push(SimilarIssue {
                    issue: record.clone(),
                    distance: hit.distance,
                    similarity: (1.0 - hit.distance).max(0.0),
                });
                if results.len() == top_k {
                    break;
                }
            }
        }

        Ok(results)
    }
}
