use anyhow::Context;
use tracing::info;

use crate::Result;
use crate::cache::{ArtifactKind, CacheService, Source};
use crate::config::Config;
use crate::database::sqlite::models::ScopedQueryOutcome;

async fn open_service() -> Result<CacheService> {
    let config = Config::load_default()?;
    CacheService::new(config).await
}

fn describe(source: Source) -> &'static str {
    match source {
        Source::Cache => "cache",
        Source::Api => "GitHub API",
        Source::Generated => "newly generated",
    }
}

/// Show repository metadata: open issues, contributors, stars.
#[inline]
pub async fn show_repository(repo_name: &str, force_refresh: bool) -> Result<()> {
    let service = open_service().await?;
    let result = service.repository(repo_name, force_refresh).await?;

    println!("Repository: {repo_name} (from {})", describe(result.source));
    println!(
        "{}",
        serde_json::to_string_pretty(&result.data).context("Failed to render metadata")?
    );

    Ok(())
}

/// Show the repository's issue batch.
#[inline]
pub async fn show_issues(repo_name: &str, force_refresh: bool) -> Result<()> {
    let service = open_service().await?;
    let result = service.issues(repo_name, force_refresh).await?;

    let count = result.data.as_array().map_or(0, Vec::len);
    println!(
        "Issues for {repo_name}: {count} (from {})",
        describe(result.source)
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&result.data).context("Failed to render issues")?
    );

    Ok(())
}

/// Produce or serve a derived artifact for the repository.
#[inline]
pub async fn show_artifact(
    repo_name: &str,
    kind: ArtifactKind,
    force_refresh: bool,
) -> Result<()> {
    let service = open_service().await?;
    let result = service.artifact(repo_name, kind, force_refresh).await?;

    println!("Artifact {kind} for {repo_name} (from {})", describe(result.source));
    println!(
        "{}",
        serde_json::to_string_pretty(&result.data).context("Failed to render artifact")?
    );

    Ok(())
}

/// Show presence and freshness of every cache row for the repository.
#[inline]
pub async fn show_cache_status(repo_name: &str) -> Result<()> {
    let service = open_service().await?;
    let status = service.cache_status(repo_name).await?;

    println!("Cache status for {repo_name}:");
    println!(
        "{}",
        serde_json::to_string_pretty(&status).context("Failed to render status")?
    );

    Ok(())
}

/// Drop every cached row and vector for the repository.
#[inline]
pub async fn clear_repository(repo_name: &str) -> Result<()> {
    let service = open_service().await?;
    let removed = service.clear(repo_name).await?;

    println!("Cleared cache for {repo_name}");
    println!("  Issues removed: {removed}");

    Ok(())
}

/// Fetch (through the cache) and index the repository's issues for
/// similarity search.
#[inline]
pub async fn index_repository(repo_name: &str, force_refresh: bool) -> Result<()> {
    info!("Indexing issues for {}", repo_name);

    let service = open_service().await?;
    let outcome = service.index_issues(repo_name, force_refresh).await?;

    println!("Indexing completed for {repo_name}");
    println!("  Newly stored: {}", outcome.inserted);
    println!("  Embedded: {}", outcome.embedded);
    println!("  Skipped: {}", outcome.skipped);

    Ok(())
}

/// Find issues similar to a free-text query.
#[inline]
pub async fn search_issues(repo_name: &str, query: &str, top_k: usize) -> Result<()> {
    let service = open_service().await?;
    let matches = service.similarity_search(repo_name, query, top_k).await?;

    if matches.is_empty() {
        println!("No similar issues found for \"{query}\" in {repo_name}.");
        println!("Run 'repolens index {repo_name}' first if the repository is not indexed.");
        return Ok(());
    }

    println!("Similar issues in {repo_name}:");
    for result in &matches {
        println!(
            "  #{} {} (similarity {:.3})",
            result.issue.issue_number, result.issue.title, result.similarity
        );
    }

    Ok(())
}

/// Run a read-only SQL query against the repository's issues.
#[inline]
pub async fn run_query(repo_name: &str, sql: &str) -> Result<()> {
    let service = open_service().await?;
    let outcome = service.scoped_query(repo_name, sql).await?;

    match outcome {
        ScopedQueryOutcome::Rows(rows) => {
            println!("{}", rows.columns.join(" | "));
            for row in &rows.rows {
                let rendered: Vec<String> = row
                    .iter()
                    .map(|value| match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                println!("{}", rendered.join(" | "));
            }
            println!();
            println!("{} rows", rows.rows.len());
        }
        ScopedQueryOutcome::Error { error, query } => {
            println!("Query failed: {error}");
            println!("  Query: {query}");
        }
    }

    Ok(())
}

/// Show the active configuration with credentials masked.
#[inline]
pub fn show_config() -> Result<()> {
    let mut config = Config::load_default()?;

    config.github.token = config.github.token.map(|_| "<set>".to_string());
    config.embedding.api_key = config.embedding.api_key.map(|_| "<set>".to_string());
    config.atlas.api_key = config.atlas.api_key.map(|_| "<set>".to_string());

    println!("Configuration file: {}", config.config_file_path().display());
    println!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to render configuration")?
    );

    Ok(())
}
