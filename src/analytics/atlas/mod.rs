#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::TextField;
use crate::config::AtlasConfig;
use crate::ingest::normalize::NormalizedIssue;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Client for the Atlas topic-discovery service.
///
/// Topic discovery is a slow remote job: documents are submitted, then the
/// job is polled a bounded number of times. When the budget runs out the
/// payload reports `processing` and the caching layer's grace rule decides
/// when to try again.
#[derive(Debug, Clone)]
pub struct AtlasClient {
    base_url: Url,
    api_key: Option<String>,
    poll_interval: Duration,
    max_polls: u32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct SubmitRequest {
    documents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    status: String,
    #[serde(default)]
    topics: Vec<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl AtlasClient {
    #[inline]
    pub fn new(config: &AtlasConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Self {
            base_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_polls: config.max_polls,
            agent,
        }
    }

    /// Run topic discovery over one text field of the given issues.
    ///
    /// Returns `None` when there are no documents to submit. Otherwise the
    /// payload always carries a `status` of `complete`, `processing`,
    /// `timeout`, or `error`; remote-side failures are data, not `Err`.
    #[inline]
    pub fn discover_topics(
        &self,
        issues: &[NormalizedIssue],
        field: TextField,
    ) -> Result<Option<Value>> {
        let documents: Vec<String> = issues
            .iter()
            .map(|issue| field.extract(issue).trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();

        if documents.is_empty() {
            debug!("No documents for Atlas topic discovery on {}", field);
            return Ok(None);
        }

        let document_count = documents.len();
        let job_id = self.submit(documents)?;
        info!(
            "Submitted Atlas topic job {} ({} documents)",
            job_id, document_count
        );

        for poll in 1..=self.max_polls {
            let job = self.poll_job(&job_id)?;
            debug!(
                "Atlas job {} poll {}/{}: {}",
                job_id, poll, self.max_polls, job.status
            );

            match job.status.as_str() {
                "complete" => {
                    return Ok(Some(json!({
                        "status": "complete",
                        "field": field.as_str(),
                        "topics": job.topics,
                        "document_count": document_count,
                    })));
                }
                "error" => {
                    warn!("Atlas job {} failed: {:?}", job_id, job.message);
                    return Ok(Some(json!({
                        "status": "error",
                        "field": field.as_str(),
                        "message": job.message.unwrap_or_else(|| "unknown error".to_string()),
                    })));
                }
                "timeout" => {
                    return Ok(Some(json!({
                        "status": "timeout",
                        "field": field.as_str(),
                    })));
                }
                _ => {
                    if poll < self.max_polls {
                        std::thread::sleep(self.poll_interval);
                    }
                }
            }
        }

        // Poll budget exhausted with the job still running. The cached
        // payload keeps the job id for observability only.
        Ok(Some(json!({
            "status": "processing",
            "field": field.as_str(),
            "job_id": job_id,
        })))
    }

    fn submit(&self, documents: Vec<String>) -> Result<String> {
        let url = self
            .base_url
            .join("/v1/topics/submit")
            .context("Failed to build Atlas submit URL")?;

        let body = serde_json::to_string(&SubmitRequest { documents })
            .context("Failed to serialize Atlas submit request")?;

        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response_text = request
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("Atlas submit request failed")?;

        let response: SubmitResponse = serde_json::from_str(&response_text)
            .context("Failed to parse Atlas submit response")?;
        Ok(response.job_id)
    }

    fn poll_job(&self, job_id: &str) -> Result<JobResponse> {
        let url = self
            .base_url
            .join(&format!("/v1/topics/jobs/{job_id}"))
            .context("Failed to build Atlas job URL")?;

        let mut request = self.agent.get(url.as_str());
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response_text = request
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("Atlas job poll failed")?;

        serde_json::from_str(&response_text).context("Failed to parse Atlas job response")
    }
}
