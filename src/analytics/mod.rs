// Analytics module
// Derived-artifact producers over normalized issues. The text producers
// are pure; Atlas topic discovery calls out to an external service.

pub mod atlas;
pub mod insights;
pub mod stopwords;
pub mod topics;
pub mod wordcloud;

use crate::ingest::normalize::NormalizedIssue;
use serde::{Deserialize, Serialize};

/// Which text field of an issue a producer analyzes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextField {
    Title,
    Body,
}

impl TextField {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Body => "body",
        }
    }

    /// Extract this field's text from an issue. Missing bodies read as
    /// empty rather than skipping the issue.
    #[inline]
    pub fn extract<'a>(self, issue: &'a NormalizedIssue) -> &'a str {
        match self {
            Self::Title => &issue.title,
            Self::Body => issue.body.as_deref().unwrap_or(""),
        }
    }
}

impl std::fmt::Display for TextField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TextField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(Self::Title),
            "body" => Ok(Self::Body),
            other => Err(format!("Unknown text field: {other} (expected title or body)")),
        }
    }
}
