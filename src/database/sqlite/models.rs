use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cached repository metadata row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSnapshot {
    pub repo_name: String,
    pub repo_info: Value,
    pub last_updated: DateTime<Utc>,
}

/// Cached issue batch row. `issues_data` holds the full list as one JSON
/// array so a hit can be served without touching the `issues` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueBatch {
    pub repo_name: String,
    pub issues_data: Value,
    pub last_updated: DateTime<Utc>,
}

/// A derived analytics artifact for one repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub repo_name: String,
    pub artifact_type: String,
    pub data: Value,
    pub last_updated: DateTime<Utc>,
}

impl Artifact {
    /// Producer-reported sub-status embedded in the payload, if any.
    /// Artifacts without a `status` field are treated as complete.
    #[inline]
    pub fn sub_status(&self) -> Option<&str> {
        self.data.get("status").and_then(Value::as_str)
    }

    #[inline]
    pub fn is_processing(&self) -> bool {
        self.sub_status() == Some("processing")
    }
}

/// One normalized issue, keyed by the upstream issue id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: i64,
    pub repo_name: String,
    pub issue_number: i64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub author: String,
    pub created_at: String,
    pub updated_at: Option<String>,
    /// Label names joined with ", ".
    pub labels: String,
}

/// Result of a successfully executed scoped query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedQueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub query: String,
}

/// Outcome of a scoped query. Execution failures are data, not errors:
/// callers render them the same way they render rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopedQueryOutcome {
    Rows(ScopedQueryRows),
    Error { error: String, query: String },
}
