//! Aggregate statistics over a repository's issues.

use chrono::{DateTime, Datelike, Timelike};
use itertools::Itertools;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};

use crate::ingest::normalize::NormalizedIssue;

const TOP_CONTRIBUTORS: usize = 10;
const HOURS_PER_DAY: f64 = 24.0;

/// Summary statistics payload, or `None` for an empty issue set.
#[inline]
pub fn insights(issues: &[NormalizedIssue]) -> Option<Value> {
    if issues.is_empty() {
        return None;
    }

    Some(json!({
        "total_issues": issues.len(),
        "states": state_counts(issues),
        "time_to_close_days": time_to_close_stats(issues),
        "top_contributors": top_contributors(issues),
        "comments": comment_stats(issues),
        "issues_over_time": issues_over_time(issues),
        "state_over_time": state_over_time(issues),
        "activity_heatmap": activity_heatmap(issues),
    }))
}

fn state_counts(issues: &[NormalizedIssue]) -> Value {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for issue in issues {
        *counts.entry(issue.state.as_str()).or_insert(0) += 1;
    }
    json!(counts)
}

fn time_to_close_stats(issues: &[NormalizedIssue]) -> Value {
    let mut days: Vec<f64> = issues
        .iter()
        .filter_map(|issue| issue.time_to_close)
        .map(|hours| hours / HOURS_PER_DAY)
        .collect();

    if days.is_empty() {
        return Value::Null;
    }
    days.sort_by(|a, b| a.total_cmp(b));

    let sum: f64 = days.iter().sum();
    json!({
        "mean": round2(sum / days.len() as f64),
        "median": round2(median(&days)),
        "min": round2(days[0]),
        "max": round2(days[days.len() - 1]),
        "closed_with_duration": days.len(),
    })
}

fn top_contributors(issues: &[NormalizedIssue]) -> Value {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for issue in issues {
        if !issue.author.is_empty() {
            *counts.entry(issue.author.as_str()).or_insert(0) += 1;
        }
    }

    let ranked: Vec<Value> = counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .take(TOP_CONTRIBUTORS)
        .map(|(author, count)| json!({"author": author, "count": count}))
        .collect();

    json!(ranked)
}

fn comment_stats(issues: &[NormalizedIssue]) -> Value {
    let mut counts: Vec<f64> = issues.iter().map(|issue| issue.comments as f64).collect();
    counts.sort_by(|a, b| a.total_cmp(b));

    let total: f64 = counts.iter().sum();
    json!({
        "total": total as u64,
        "mean": round2(total / counts.len() as f64),
        "median": round2(median(&counts)),
        "max": counts[counts.len() - 1] as u64,
    })
}

/// Created-issue counts per month, with a running cumulative total.
fn issues_over_time(issues: &[NormalizedIssue]) -> Value {
    let mut per_month: BTreeMap<String, u64> = BTreeMap::new();
    for issue in issues {
        if let Some(month) = month_of(&issue.created_at) {
            *per_month.entry(month).or_insert(0) += 1;
        }
    }

    let mut cumulative = 0u64;
    let series: Vec<Value> = per_month
        .into_iter()
        .map(|(month, count)| {
            cumulative += count;
            json!({"month": month, "count": count, "cumulative": cumulative})
        })
        .collect();

    json!(series)
}

fn state_over_time(issues: &[NormalizedIssue]) -> Value {
    let mut per_month: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for issue in issues {
        if let Some(month) = month_of(&issue.created_at) {
            let entry = per_month.entry(month).or_insert((0, 0));
            if issue.state == "closed" {
                entry.1 += 1;
            } else {
                entry.0 += 1;
            }
        }
    }

    let series: Vec<Value> = per_month
        .into_iter()
        .map(|(month, (open, closed))| json!({"month": month, "open": open, "closed": closed}))
        .collect();

    json!(series)
}

/// Weekday (Monday first) by hour-of-day creation counts.
fn activity_heatmap(issues: &[NormalizedIssue]) -> Value {
    let mut grid = [[0u64; 24]; 7];
    for issue in issues {
        if let Ok(created) = DateTime::parse_from_rfc3339(&issue.created_at) {
            let day = created.weekday().num_days_from_monday() as usize;
            let hour = created.hour() as usize;
            grid[day][hour] += 1;
        }
    }

    json!(grid.iter().map(|row| row.to_vec()).collect::<Vec<_>>())
}

fn month_of(created_at: &str) -> Option<String> {
    let created = DateTime::parse_from_rfc3339(created_at).ok()?;
    Some(format!("{:04}-{:02}", created.year(), created.month()))
}

/// Median of a sorted slice.
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
