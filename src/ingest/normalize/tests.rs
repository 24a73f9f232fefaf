use super::*;
use serde_json::json;

fn shaped_issue(id: i64, number: i64) -> serde_json::Value {
    json!({
        "id": id,
        "number": number,
        "title": "Crash on startup",
        "body": "Stack trace attached",
        "state": "open",
        "user": "octocat",
        "comments": 3,
        "labels": ["bug", "crash"],
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-02T00:00:00Z",
        "closed_at": null,
        "time_to_close": null,
        "html_url": "https://github.com/owner/repo/issues/1",
    })
}

#[test]
fn normalizes_full_element() {
    let issues = normalize_batch(&json!([shaped_issue(100, 5)])).expect("should normalize");

    assert_eq!(issues.len(), 1);
    let issue = &issues[0];
    assert_eq!(issue.id, 100);
    assert_eq!(issue.number, 5);
    assert_eq!(issue.title, "Crash on startup");
    assert_eq!(issue.body.as_deref(), Some("Stack trace attached"));
    assert_eq!(issue.author, "octocat");
    assert_eq!(issue.comments, 3);
    assert_eq!(issue.labels, vec!["bug", "crash"]);
    assert_eq!(
        issue.html_url.as_deref(),
        Some("https://github.com/owner/repo/issues/1")
    );
}

#[test]
fn already_normal_input_is_idempotent() {
    let batch = json!([shaped_issue(1, 1), shaped_issue(2, 2)]);

    let first = normalize_batch(&batch).expect("should normalize");
    let reserialized = serde_json::to_value(&first).expect("should serialize");
    let second = normalize_batch(&reserialized).expect("should normalize");

    assert_eq!(first, second);
}

#[test]
fn doubly_encoded_top_level_is_unwrapped_once() {
    let inner = json!([shaped_issue(1, 1)]).to_string();
    let batch = Value::String(inner);

    let issues = normalize_batch(&batch).expect("should normalize");
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, 1);
}

#[test]
fn non_sequence_top_level_fails_whole_batch() {
    assert!(matches!(
        normalize_batch(&json!({"not": "an array"})),
        Err(RepolensError::MalformedCache(_))
    ));
    assert!(matches!(
        normalize_batch(&Value::String("not json at all".to_string())),
        Err(RepolensError::MalformedCache(_))
    ));
}

#[test]
fn stringified_elements_are_decoded() {
    let element = Value::String(shaped_issue(7, 7).to_string());
    let issues = normalize_batch(&json!([element])).expect("should normalize");

    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, 7);
}

#[test]
fn missing_number_skips_only_that_element() {
    let mut bad = shaped_issue(3, 3);
    bad.as_object_mut().expect("is object").remove("number");

    let batch = json!([
        shaped_issue(1, 1),
        shaped_issue(2, 2),
        bad,
        shaped_issue(4, 4),
        shaped_issue(5, 5),
    ]);

    let issues = normalize_batch(&batch).expect("should normalize");

    assert_eq!(issues.len(), 4);
    let numbers: Vec<i64> = issues.iter().map(|i| i.number).collect();
    assert_eq!(numbers, vec![1, 2, 4, 5]);
}

#[test]
fn legacy_field_names_are_accepted() {
    let legacy = json!({
        "issue_id": 42,
        "issue_number": 9,
        "title": "Old shape",
    });

    let issues = normalize_batch(&json!([legacy])).expect("should normalize");
    assert_eq!(issues[0].id, 42);
    assert_eq!(issues[0].number, 9);
}

#[test]
fn author_from_object_or_flat_string() {
    let object_form = json!({"id": 1, "number": 1, "user": {"login": "alice"}});
    let flat_form = json!({"id": 2, "number": 2, "user": "bob"});
    let missing = json!({"id": 3, "number": 3});

    let issues =
        normalize_batch(&json!([object_form, flat_form, missing])).expect("should normalize");

    assert_eq!(issues[0].author, "alice");
    assert_eq!(issues[1].author, "bob");
    assert_eq!(issues[2].author, "");
}

#[test]
fn labels_from_objects_strings_or_encoded_json() {
    let object_labels = json!({"id": 1, "number": 1, "labels": [{"name": "bug"}]});
    let string_labels = json!({"id": 2, "number": 2, "labels": ["bug", "ui"]});
    let encoded_labels = json!({"id": 3, "number": 3, "labels": "[\"bug\"]"});
    let garbage_labels = json!({"id": 4, "number": 4, "labels": "not json"});

    let issues = normalize_batch(&json!([
        object_labels,
        string_labels,
        encoded_labels,
        garbage_labels
    ]))
    .expect("should normalize");

    assert_eq!(issues[0].labels, vec!["bug"]);
    assert_eq!(issues[1].labels, vec!["bug", "ui"]);
    assert_eq!(issues[2].labels, vec!["bug"]);
    assert!(issues[3].labels.is_empty());
}

#[test]
fn to_record_joins_labels() {
    let issues = normalize_batch(&json!([shaped_issue(1, 1)])).expect("should normalize");
    let record = issues[0].to_record("owner/repo");

    assert_eq!(record.repo_name, "owner/repo");
    assert_eq!(record.issue_number, 1);
    assert_eq!(record.labels, "bug, crash");
}

#[test]
fn embedding_text_combines_title_and_body() {
    let issues = normalize_batch(&json!([shaped_issue(1, 1)])).expect("should normalize");
    assert_eq!(
        issues[0].embedding_text(),
        "Crash on startup\n\nStack trace attached"
    );

    let mut no_body = issues[0].clone();
    no_body.body = None;
    assert_eq!(no_body.embedding_text(), "Crash on startup");

    no_body.body = Some("   ".to_string());
    assert_eq!(no_body.embedding_text(), "Crash on startup");
}
