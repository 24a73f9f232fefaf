
use anyhow::{Context, Result};
use chrono::DateTime;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::GithubConfig;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const ISSUES_PER_PAGE: u32 = 100;
const USER_AGENT: &str = "repolens";

/// Client for the GitHub REST API.
///
/// Unauthenticated requests work but are limited to 60 per hour; a token
/// from the configuration raises that ceiling.
#[derive(Debug, Clone)]
pub struct GithubClient {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
    retry_attempts: u32,
}

impl GithubClient {
    #[inline]
    pub fn new(config: &GithubConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Self {
            base_url: config.api_url.clone(),
            token: config.token.clone(),
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Fetch summary metadata for a repository: open issue count,
    /// contributor count, and stars.
    #[inline]
    pub fn fetch_repo_metadata(&self, repo_name: &str) -> Result<Value> {
        debug!("Fetching repository metadata for {}", repo_name);

        let url = self
            .base_url
            .join(&format!("/repos/{repo_name}"))
            .context("Failed to build repository URL")?;

        let (body, _) = self.get(&url)?;
        let repo: Value =
            serde_json::from_str(&body).context("Failed to parse repository response")?;

        let contributors = self.count_contributors(repo_name)?;

        Ok(json!({
            "open_issues": repo.get("open_issues_count").and_then(Value::as_i64).unwrap_or(0),
            "contributors": contributors,
            "stars": repo.get("stargazers_count").and_then(Value::as_i64).unwrap_or(0),
        }))
    }

    /// Contributor count via a one-per-page request: the last-page number
    /// in the Link header is the total.
    fn count_contributors(&self, repo_name: &str) -> Result<i64> {
        let url = self
            .base_url
            .join(&format!(
                "/repos/{repo_name}/contributors?per_page=1&anonymous=true"
            ))
            .context("Failed to build contributors URL")?;

        let (body, link) = self.get(&url)?;

        if let Some(last_page) = link.as_deref().and_then(parse_link_page("last")) {
            return Ok(last_page);
        }

        // No Link header means everything fit on one page.
        let contributors: Value =
            serde_json::from_str(&body).context("Failed to parse contributors response")?;
        Ok(contributors.as_array().map_or(0, |a| a.len() as i64))
    }

    /// Fetch all issues for a repository, following Link-header pagination.
    /// Pull requests are excluded and malformed elements are skipped.
    #[inline]
    pub fn fetch_issues(&self, repo_name: &str) -> Result<Vec<Value>> {
        debug!("Fetching issues for {}", repo_name);

        let mut next_url = Some(
            self.base_url
                .join(&format!(
                    "/repos/{repo_name}/issues?state=all&per_page={ISSUES_PER_PAGE}"
                ))
                .context("Failed to build issues URL")?,
        );

        let mut issues = Vec::new();
        let mut skipped = 0usize;

        while let Some(url) = next_url.take() {
            let (body, link) = self.get(&url)?;
            let page: Value =
                serde_json::from_str(&body).context("Failed to parse issues response")?;

            let Some(elements) = page.as_array() else {
                anyhow::bail!("Issues response is not an array");
            };

            for raw in elements {
                // The issues endpoint also returns pull requests.
                if raw.get("pull_request").is_some() {
                    continue;
                }

                match shape_issue(raw) {
                    Some(issue) => issues.push(issue),
                    None => skipped += 1,
                }
            }

            next_url = link
                .as_deref()
                .and_then(parse_link_url("next"))
                .map(|next| Url::parse(&next))
                .transpose()
                .context("Failed to parse pagination URL")?;
        }

        if skipped > 0 {
            warn!(
                "Skipped {} malformed issue elements for {}",
                skipped, repo_name
            );
        }

        debug!("Fetched {} issues for {}", issues.len(), repo_name);
        Ok(issues)
    }

    fn get(&self, url: &Url) -> Result<(String, Option<String>)> {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            let mut request = self
                .agent
                .get(url.as_str())
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", USER_AGENT);
            if let Some(token) = &self.token {
                request = request.header("Authorization", format!("token {token}"));
            }

            match request.call() {
                Ok(mut response) => {
                    let remaining = response
                        .headers()
                        .get("x-ratelimit-remaining")
                        .and_then(|value| value.to_str().ok())
                        .and_then(|value| value.parse::<u64>().ok());
                    if let Some(remaining) = remaining.filter(|r| *r < 10) {
                        warn!(
                            "GitHub rate limit nearly exhausted: {} requests remaining",
                            remaining
                        );
                    }

                    let link = response
                        .headers()
                        .get("link")
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string);
                    let body = response
                        .body_mut()
                        .read_to_string()
                        .context("Failed to read response body")?;
                    return Ok((body, link));
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status == 403 || *status == 429 {
                                warn!(
                                    "GitHub returned {} for {}; likely rate limited. \
                                     Configure github.token to raise the limit",
                                    status, url
                                );
                                return Err(anyhow::anyhow!(
                                    "GitHub rate limit hit: HTTP {status}"
                                ));
                            } else if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                return Err(anyhow::anyhow!("Client error: HTTP {status}"));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => return Err(anyhow::anyhow!("Non-retryable error: {error}")),
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {error}"));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {error}"));

                    if attempt < self.retry_attempts {
                        let delay = Duration::from_millis(
                            EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000,
                        );
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

/// Reduce a raw GitHub issue to the fields the analytics pipeline uses.
/// Elements missing their identity (id or number) are dropped.
fn shape_issue(raw: &Value) -> Option<Value> {
    let id = raw.get("id").and_then(Value::as_i64);
    let number = raw.get("number").and_then(Value::as_i64);
    let (Some(id), Some(number)) = (id, number) else {
        warn!("Skipping issue element without id or number");
        return None;
    };

    let created_at = raw.get("created_at").and_then(Value::as_str);
    let closed_at = raw.get("closed_at").and_then(Value::as_str);

    Some(json!({
        "id": id,
        "number": number,
        "title": raw.get("title").and_then(Value::as_str).unwrap_or(""),
        "body": raw.get("body").and_then(Value::as_str),
        "state": raw.get("state").and_then(Value::as_str).unwrap_or("open"),
        "user": raw.pointer("/user/login").and_then(Value::as_str).unwrap_or(""),
        "comments": raw.get("comments").and_then(Value::as_i64).unwrap_or(0),
        "labels": raw
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|label| label.get("name").and_then(Value::as_str))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default(),
        "created_at": created_at,
        "updated_at": raw.get("updated_at").and_then(Value::as_str),
        "closed_at": closed_at,
        "time_to_close": time_to_close_hours(created_at, closed_at),
        "html_url": raw.get("html_url").and_then(Value::as_str),
    }))
}

/// Hours between creation and close, rounded to two decimals.
fn time_to_close_hours(created_at: Option<&str>, closed_at: Option<&str>) -> Option<f64> {
    let created = DateTime::parse_from_rfc3339(created_at?).ok()?;
    let closed = DateTime::parse_from_rfc3339(closed_at?).ok()?;
    let hours = (closed - created).num_seconds() as f64 / 3600.0;
    Some((hours * 100.0).round() / 100.0)
}

/// Extract the URL for the given rel from a Link header.
fn parse_link_url(rel: &'static str) -> impl Fn(&str) -> Option<String> {
    move |header| {
        header.split(',').find_map(|part| {
            let (url_part, params) = part.split_once(';')?;
            if params.contains(&format!("rel=\"{rel}\"")) {
                Some(
                    url_part
                        .trim()
                        .trim_start_matches('<')
                        .trim_end_matches('>')
                        .to_string(),
                )
            } else {
                None
            }
        })
    }
}

/// Extract the page number for the given rel from a Link header.
fn parse_link_page(rel: &'static str) -> impl Fn(&str) -> Option<i64> {
    move |header| {
        let url = parse_link_url(rel)(header)?;
        let parsed = Url::parse(&url).ok()?;
        parsed
            .query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
    }
}
