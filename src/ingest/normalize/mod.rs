#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::database::sqlite::models::IssueRecord;
use crate::{RepolensError, Result};

/// One issue in normal form. Cached batches have accumulated several
/// shapes over time (doubly-encoded payloads, stringified elements,
/// author objects vs. flat strings, label objects vs. names), and this is
/// the single shape the rest of the pipeline consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedIssue {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub author: String,
    pub comments: i64,
    pub labels: Vec<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub closed_at: Option<String>,
    pub time_to_close: Option<f64>,
    pub html_url: Option<String>,
}

impl NormalizedIssue {
    /// Row form for the `issues` table. Labels are stored joined so they
    /// stay greppable from scoped SQL.
    #[inline]
    pub fn to_record(&self, repo_name: &str) -> IssueRecord {
        IssueRecord {
            id: self.id,
            repo_name: repo_name.to_string(),
            issue_number: self.number,
            title: self.title.clone(),
            body: self.body.clone(),
            state: self.state.clone(),
            author: self.author.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            labels: self.labels.join(", "),
        }
    }

    /// The text this issue is embedded under: title, then body.
    #[inline]
    pub fn embedding_text(&self) -> String {
        match self.body.as_deref() {
            Some(body) if !body.trim().is_empty() => format!("{}\n\n{}", self.title, body),
            _ => self.title.clone(),
        }
    }
}

/// Normalize a cached or freshly fetched issue batch.
///
/// The top level may be an array or a JSON string containing one (a
/// doubly-encoded legacy entry, unwrapped once). Anything else fails with
/// `MalformedCache`. Within the batch, unusable elements are skipped with
/// a warning; one bad element never fails the whole batch. Already-normal
/// input passes through unchanged.
#[inline]
pub fn normalize_batch(raw: &Value) -> Result<Vec<NormalizedIssue>> {
    let decoded;
    let elements = match raw {
        Value::Array(elements) => elements,
        Value::String(inner) => {
            decoded = serde_json::from_str::<Value>(inner).map_err(|e| {
                RepolensError::MalformedCache(format!("Issue batch is not decodable JSON: {e}"))
            })?;
            decoded.as_array().ok_or_else(|| {
                RepolensError::MalformedCache(
                    "Issue batch decoded to a non-array value".to_string(),
                )
            })?
        }
        other => {
            return Err(RepolensError::MalformedCache(format!(
                "Issue batch has unexpected type: {}",
                type_name(other)
            )));
        }
    };

    let mut issues = Vec::with_capacity(elements.len());
    let mut skipped = 0usize;

    for element in elements {
        match normalize_element(element) {
            Some(issue) => issues.push(issue),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} unnormalizable issue elements", skipped);
    }

    Ok(issues)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalize one element. Stringified elements are decoded first; then
/// the element must be an object carrying an id and an issue number under
/// either their current or legacy key.
fn normalize_element(element: &Value) -> Option<NormalizedIssue> {
    let decoded;
    let object = match element {
        Value::String(inner) => {
            decoded = serde_json::from_str::<Value>(inner).ok().or_else(|| {
                warn!("Skipping issue element that is not decodable JSON");
                None
            })?;
            &decoded
        }
        other => other,
    };

    if !object.is_object() {
        warn!("Skipping non-object issue element");
        return None;
    }

    let id = int_field(object, &["id", "issue_id"]).or_else(|| {
        warn!("Skipping issue element without id");
        None
    })?;
    let number = int_field(object, &["number", "issue_number"]).or_else(|| {
        warn!("Skipping issue element without issue number");
        None
    })?;

    Some(NormalizedIssue {
        id,
        number,
        title: object
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        body: object.get("body").and_then(Value::as_str).map(str::to_string),
        state: object
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or("open")
            .to_string(),
        author: author_field(object),
        comments: object.get("comments").and_then(Value::as_i64).unwrap_or(0),
        labels: labels_field(object),
        created_at: object
            .get("created_at")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        updated_at: object
            .get("updated_at")
            .and_then(Value::as_str)
            .map(str::to_string),
        closed_at: object
            .get("closed_at")
            .and_then(Value::as_str)
            .map(str::to_string),
        time_to_close: object.get("time_to_close").and_then(Value::as_f64),
        html_url: object
            .get("html_url")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn int_field(object: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| {
        let value = object.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
    })
}

/// The author appears either as a flat login string under `user`, or as a
/// `{login}` object under `user` or `author`.
fn author_field(object: &Value) -> String {
    for key in ["user", "author"] {
        match object.get(key) {
            Some(Value::String(login)) => return login.clone(),
            Some(Value::Object(_)) => {
                if let Some(login) = object
                    .pointer(&format!("/{key}/login"))
                    .and_then(Value::as_str)
                {
                    return login.to_string();
                }
            }
            _ => {}
        }
    }
    String::new()
}

/// Labels appear as an array of names, an array of `{name}` objects, or a
/// JSON string encoding either.
fn labels_field(object: &Value) -> Vec<String> {
    let decoded;
    let labels = match object.get("labels") {
        Some(Value::Array(labels)) => labels,
        Some(Value::String(inner)) => {
            decoded = serde_json::from_str::<Value>(inner).ok();
            match decoded.as_ref().and_then(Value::as_array) {
                Some(labels) => labels,
                None => return Vec::new(),
            }
        }
        _ => return Vec::new(),
    };

    labels
        .iter()
        .filter_map(|label| match label {
            Value::String(name) => Some(name.clone()),
            Value::Object(_) => label
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}
