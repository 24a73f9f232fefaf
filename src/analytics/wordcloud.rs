//! Stopword-filtered token frequencies rendered two ways: wordcloud words
//! and treemap cells.

use itertools::Itertools;
use serde_json::{Value, json};
use std::collections::HashMap;

use super::{TextField, stopwords};
use crate::ingest::normalize::NormalizedIssue;

const MAX_WORDS: usize = 100;
const MAX_TREEMAP_CELLS: usize = 30;
const MIN_TOKEN_LENGTH: usize = 3;

/// Frequency payload over one text field, or `None` when there is nothing
/// to count.
#[inline]
pub fn wordcloud(issues: &[NormalizedIssue], field: TextField) -> Option<Value> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for issue in issues {
        for token in tokens(field.extract(issue)) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    if counts.is_empty() {
        return None;
    }

    // Count descending, then alphabetical so output is deterministic.
    let ranked: Vec<(String, u64)> = counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(MAX_WORDS)
        .collect();

    let words: Vec<Value> = ranked
        .iter()
        .map(|(text, value)| json!({"text": text, "value": value}))
        .collect();
    let cells: Vec<Value> = ranked
        .iter()
        .take(MAX_TREEMAP_CELLS)
        .map(|(name, value)| json!({"name": name, "value": value}))
        .collect();

    Some(json!({
        "field": field.as_str(),
        "wordcloud": {"words": words},
        "treemap": {"children": cells},
    }))
}

/// Lowercased alphabetic tokens, short tokens and stopwords removed.
pub(super) fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|token| token.len() >= MIN_TOKEN_LENGTH)
        .map(str::to_lowercase)
        .filter(|token| !stopwords::is_stopword(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_with_title(id: i64, title: &str) -> NormalizedIssue {
        NormalizedIssue {
            id,
            number: id,
            title: title.to_string(),
            body: None,
            state: "open".to_string(),
            author: "octocat".to_string(),
            comments: 0,
            labels: Vec::new(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: None,
            closed_at: None,
            time_to_close: None,
            html_url: None,
        }
    }

    #[test]
    fn counts_across_issues() {
        let issues = vec![
            issue_with_title(1, "database crash during migration"),
            issue_with_title(2, "database timeout"),
        ];

        let payload = wordcloud(&issues, TextField::Title).expect("should produce");
        let words = payload["wordcloud"]["words"]
            .as_array()
            .expect("words array");

        assert_eq!(words[0]["text"], "database");
        assert_eq!(words[0]["value"], 2);
    }

    #[test]
    fn stopwords_and_short_tokens_are_dropped() {
        let issues = vec![issue_with_title(1, "the fix of an UI bug")];

        let payload = wordcloud(&issues, TextField::Title);
        // "the"/"fix"/"of"/"bug" are stopwords, "an"/"UI" too short.
        assert!(payload.is_none());
    }

    #[test]
    fn empty_input_produces_nothing() {
        assert!(wordcloud(&[], TextField::Title).is_none());

        let bodyless = vec![issue_with_title(1, "")];
        assert!(wordcloud(&bodyless, TextField::Body).is_none());
    }

    #[test]
    fn treemap_mirrors_top_words() {
        let issues = vec![issue_with_title(1, "database database migration")];

        let payload = wordcloud(&issues, TextField::Title).expect("should produce");
        assert_eq!(
            payload["treemap"]["children"][0],
            json!({"name": "database", "value": 2})
        );
    }

    #[test]
    fn deterministic_order_for_equal_counts() {
        let issues = vec![issue_with_title(1, "zebra apple")];

        let payload = wordcloud(&issues, TextField::Title).expect("should produce");
        let words = payload["wordcloud"]["words"]
            .as_array()
            .expect("words array");

        assert_eq!(words[0]["text"], "apple");
        assert_eq!(words[1]["text"], "zebra");
    }
}
