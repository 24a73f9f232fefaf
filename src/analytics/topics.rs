//! Lightweight topic grouping: the top terms are partitioned into
//! frequency bands, each band presented as one topic. No model inference
//! involved; Atlas topic discovery is the heavyweight alternative.

use itertools::Itertools;
use serde_json::{Value, json};
use std::collections::HashMap;

use super::{TextField, wordcloud};
use crate::ingest::normalize::NormalizedIssue;

const TOP_TERMS: usize = 100;
const TOPIC_COUNT: usize = 5;
const LABEL_WORDS: usize = 3;

/// Frequency-band topics over one text field, or `None` when there is
/// nothing to group.
#[inline]
pub fn topics(issues: &[NormalizedIssue], field: TextField) -> Option<Value> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for issue in issues {
        for token in wordcloud::tokens(&strip_urls(field.extract(issue))) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    if counts.is_empty() {
        return None;
    }

    let ranked: Vec<String> = counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(TOP_TERMS)
        .map(|(term, _)| term)
        .collect();

    let band_size = ranked.len().div_ceil(TOPIC_COUNT);
    let topic_list: Vec<Value> = ranked
        .chunks(band_size)
        .enumerate()
        .map(|(id, words)| {
            let label = format!(
                "Topic {}: {}",
                id + 1,
                words.iter().take(LABEL_WORDS).join(", ")
            );
            json!({"id": id, "words": words, "label": label})
        })
        .collect();

    Some(json!({
        "field": field.as_str(),
        "topics": topic_list,
    }))
}

/// Remove URL tokens before tokenization so hostnames don't surface as
/// topic terms.
fn strip_urls(text: &str) -> String {
    text.split_whitespace()
        .filter(|token| {
            !token.starts_with("http://")
                && !token.starts_with("https://")
                && !token.starts_with("www.")
        })
        .join(" ")
}
