//! Cache orchestration: every read goes through a get-or-produce flow
//! against the persistent store, with provenance reported to the caller.


pub mod freshness;

use chrono::Duration;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::analytics::atlas::AtlasClient;
use crate::analytics::{TextField, insights, topics, wordcloud};
use crate::config::{CacheConfig, Config};
use crate::database::lancedb::vector_store::VectorStore;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::ScopedQueryOutcome;
use crate::embeddings::EmbeddingClient;
use crate::github::GithubClient;
use crate::ingest::normalize::normalize_batch;
use crate::ingest::{IndexOutcome, IssueIndexer, SimilarIssue};
use crate::{RepolensError, Result};

/// Where a served result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Served from the persistent store.
    Cache,
    /// Fetched from the upstream API and cached.
    Api,
    /// Computed by a producer and cached.
    Generated,
}

/// A result plus its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct Cached<T> {
    pub data: T,
    pub source: Source,
}

/// The derived artifacts this service knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Insights,
    Wordcloud(TextField),
    Topics(TextField),
    AtlasTopics(TextField),
}

impl ArtifactKind {
    /// Storage key in `visualization_cache.artifact_type`.
    #[inline]
    pub fn key(self) -> String {
        match self {
            Self::Insights => "insights".to_string(),
            Self::Wordcloud(field) => format!("wordcloud_{field}"),
            Self::Topics(field) => format!("topics_{field}"),
            Self::AtlasTopics(field) => format!("atlas_topics_{field}"),
        }
    }

    /// Atlas artifacts are produced by a slow remote job and age under the
    /// longer topic window plus the processing-grace rule.
    #[inline]
    pub fn is_atlas(self) -> bool {
        matches!(self, Self::AtlasTopics(_))
    }

    #[inline]
    pub fn max_age(self, config: &CacheConfig) -> Duration {
        if self.is_atlas() {
            Duration::hours(config.topic_max_age_hours)
        } else {
            Duration::hours(config.default_max_age_hours)
        }
    }

    #[inline]
    pub fn all() -> [Self; 7] {
        [
            Self::Insights,
            Self::Wordcloud(TextField::Title),
            Self::Wordcloud(TextField::Body),
            Self::Topics(TextField::Title),
            Self::Topics(TextField::Body),
            Self::AtlasTopics(TextField::Title),
            Self::AtlasTopics(TextField::Body),
        ]
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "insights" => Ok(Self::Insights),
            "wordcloud_title" => Ok(Self::Wordcloud(TextField::Title)),
            "wordcloud_body" => Ok(Self::Wordcloud(TextField::Body)),
            "topics_title" => Ok(Self::Topics(TextField::Title)),
            "topics_body" => Ok(Self::Topics(TextField::Body)),
            "atlas_topics_title" => Ok(Self::AtlasTopics(TextField::Title)),
            "atlas_topics_body" => Ok(Self::AtlasTopics(TextField::Body)),
            other => Err(format!("Unknown artifact kind: {other}")),
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// The service owning every store and client, built once from `Config`.
///
/// There is no single-flight coordination: concurrent misses for the same
/// key may each produce and upsert, and the last writer wins. Producers
/// are idempotent so this only costs duplicate work.
pub struct CacheService {
    config: Config,
    database: Database,
    vector_store: VectorStore,
    github: GithubClient,
    embeddings: EmbeddingClient,
    atlas: AtlasClient,
}

impl CacheService {
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;

        let database = Database::new(config.database_path()).await?;
        let vector_store = VectorStore::new(
            config.vector_database_path(),
            config.embedding.dimension as usize,
        )
        .await?;
        let github = GithubClient::new(&config.github);
        let embeddings = EmbeddingClient::new(&config.embedding);
        let atlas = AtlasClient::new(&config.atlas);

        Ok(Self {
            config,
            database,
            vector_store,
            github,
            embeddings,
            atlas,
        })
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Repository snapshot metadata: open issues, contributors, stars.
    #[inline]
    pub async fn repository(&self, repo_name: &str, force_refresh: bool) -> Result<Cached<Value>> {
        if !force_refresh {
            if let Some(snapshot) = self.database.get_snapshot(repo_name).await? {
                if freshness::is_fresh(snapshot.last_updated, self.default_window()) {
                    debug!("Serving repository snapshot for {} from cache", repo_name);
                    return Ok(Cached {
                        data: snapshot.repo_info,
                        source: Source::Cache,
                    });
                }
            }
        }

        info!("Fetching repository metadata for {}", repo_name);
        let metadata = self
            .github
            .fetch_repo_metadata(repo_name)
            .map_err(|e| RepolensError::GitHub(format!("{e:#}")))?;

        if metadata.as_object().is_none_or(serde_json::Map::is_empty) {
            return Err(RepolensError::NotFound(format!(
                "No repository metadata for {repo_name}"
            )));
        }

        self.database.upsert_snapshot(repo_name, &metadata).await?;
        Ok(Cached {
            data: metadata,
            source: Source::Api,
        })
    }

    /// The repository's issue batch.
    ///
    /// A fresh cached batch is trusted only after a completeness check:
    /// every element must be an object carrying both id and number. An
    /// incomplete batch falls through to a refetch even without
    /// `force_refresh`.
    #[inline]
    pub async fn issues(&self, repo_name: &str, force_refresh: bool) -> Result<Cached<Value>> {
        if !force_refresh {
            if let Some(batch) = self.database.get_issue_batch(repo_name).await? {
                if freshness::is_fresh(batch.last_updated, self.default_window()) {
                    if batch_is_complete(&batch.issues_data) {
                        debug!("Serving issue batch for {} from cache", repo_name);
                        return Ok(Cached {
                            data: batch.issues_data,
                            source: Source::Cache,
                        });
                    }
                    warn!(
                        "Cached issue batch for {} is incomplete; refetching",
                        repo_name
                    );
                }
            }
        }

        info!("Fetching issues for {}", repo_name);
        let issues = self
            .github
            .fetch_issues(repo_name)
            .map_err(|e| RepolensError::GitHub(format!("{e:#}")))?;

        if issues.is_empty() {
            return Err(RepolensError::NotFound(format!(
                "No issues found for {repo_name}"
            )));
        }

        let data = Value::Array(issues);
        self.database.upsert_issue_batch(repo_name, &data).await?;
        Ok(Cached {
            data,
            source: Source::Api,
        })
    }

    /// A derived artifact, produced over the repository's issues on miss.
    #[inline]
    pub async fn artifact(
        &self,
        repo_name: &str,
        kind: ArtifactKind,
        force_refresh: bool,
    ) -> Result<Cached<Value>> {
        let key = kind.key();

        if !force_refresh {
            if let Some(artifact) = self.database.get_artifact(repo_name, &key).await? {
                // A processing payload is served only within the grace
                // window; past it the job is assumed lost and re-run.
                let window = if kind.is_atlas() && artifact.is_processing() {
                    self.grace_window()
                } else {
                    kind.max_age(&self.config.cache)
                };
                if freshness::is_fresh(artifact.last_updated, window) {
                    debug!("Serving {} for {} from cache", key, repo_name);
                    return Ok(Cached {
                        data: artifact.data,
                        source: Source::Cache,
                    });
                }
            }
        }

        let batch = self.issues(repo_name, false).await?;
        let issues = normalize_batch(&batch.data)?;

        info!("Producing {} artifact for {}", key, repo_name);
        let payload = match kind {
            ArtifactKind::Insights => insights::insights(&issues),
            ArtifactKind::Wordcloud(field) => wordcloud::wordcloud(&issues, field),
            ArtifactKind::Topics(field) => topics::topics(&issues, field),
            ArtifactKind::AtlasTopics(field) => self
                .atlas
                .discover_topics(&issues, field)
                .map_err(|e| RepolensError::Producer(format!("{e:#}")))?,
        };

        let Some(payload) = payload else {
            return Err(RepolensError::NotFound(format!(
                "Nothing to derive {key} from for {repo_name}"
            )));
        };

        self.database
            .upsert_artifact(repo_name, &key, &payload)
            .await?;
        Ok(Cached {
            data: payload,
            source: Source::Generated,
        })
    }

    /// Presence and freshness of every cache row for one repository.
    #[inline]
    pub async fn cache_status(&self, repo_name: &str) -> Result<Value> {
        let snapshot = self.database.get_snapshot(repo_name).await?;
        let batch = self.database.get_issue_batch(repo_name).await?;

        let mut artifacts = serde_json::Map::new();
        for kind in ArtifactKind::all() {
            let key = kind.key();
            let entry = match self.database.get_artifact(repo_name, &key).await? {
                Some(artifact) => {
                    let fresh =
                        freshness::is_fresh(artifact.last_updated, kind.max_age(&self.config.cache));
                    // Atlas artifacts only count once their job finished.
                    let cached = if kind.is_atlas() {
                        fresh && matches!(artifact.sub_status(), None | Some("complete"))
                    } else {
                        fresh
                    };
                    json!({
                        "present": true,
                        "cached": cached,
                        "status": artifact.sub_status(),
                        "last_updated": artifact.last_updated,
                    })
                }
                None => json!({"present": false, "cached": false}),
            };
            artifacts.insert(key, entry);
        }

        Ok(json!({
            "repo_name": repo_name,
            "repository": {
                "present": snapshot.is_some(),
                "cached": snapshot
                    .map(|s| freshness::is_fresh(s.last_updated, self.default_window()))
                    .unwrap_or(false),
            },
            "issues": {
                "present": batch.is_some(),
                "cached": batch
                    .map(|b| freshness::is_fresh(b.last_updated, self.default_window()))
                    .unwrap_or(false),
            },
            "artifacts": artifacts,
            "indexed_issues": self.database.count_issues(repo_name).await?,
        }))
    }

    /// Drop every cached row and vector for one repository. Other
    /// repositories are untouched. Returns the number of issues removed.
    #[inline]
    pub async fn clear(&self, repo_name: &str) -> Result<usize> {
        let issue_ids = self.database.clear_repository(repo_name).await?;
        self.vector_store.delete_by_ids(&issue_ids).await?;
        self.database.optimize().await?;
        Ok(issue_ids.len())
    }

    /// Resolve the issue batch (through the cache) and index it.
    #[inline]
    pub async fn index_issues(
        &self,
        repo_name: &str,
        force_refresh: bool,
    ) -> Result<IndexOutcome> {
        let batch = self.issues(repo_name, force_refresh).await?;
        self.indexer().index_repository(repo_name, &batch.data).await
    }

    #[inline]
    pub async fn similarity_search(
        &self,
        repo_name: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarIssue>> {
        self.indexer().similarity_search(repo_name, query, top_k).await
    }

    #[inline]
    pub async fn scoped_query(&self, repo_name: &str, sql: &str) -> Result<ScopedQueryOutcome> {
        self.database.scoped_query(repo_name, sql).await
    }

    fn indexer(&self) -> IssueIndexer<'_> {
        IssueIndexer::new(&self.database, &self.vector_store, &self.embeddings)
    }

    fn default_window(&self) -> Duration {
        Duration::hours(self.config.cache.default_max_age_hours)
    }

    fn grace_window(&self) -> Duration {
        Duration::hours(self.config.cache.processing_grace_hours)
    }
}

/// Every element must be an object with both id and number for the cached
/// batch to be trusted.
fn batch_is_complete(data: &Value) -> bool {
    data.as_array().is_some_and(|elements| {
        !elements.is_empty()
            && elements.iter().all(|element| {
                element.is_object()
                    && element.get("id").and_then(Value::as_i64).is_some()
                    && element.get("number").and_then(Value::as_i64).is_some()
            })
    })
}
