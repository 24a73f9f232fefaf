use super::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(server: &MockServer, max_polls: u32) -> AtlasClient {
    AtlasClient::new(&AtlasConfig {
        api_url: Url::parse(&server.uri()).expect("mock server URI should parse"),
        api_key: None,
        poll_interval_secs: 1,
        max_polls,
    })
}

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

async fn mock_submit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/topics/submit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "job-1"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn completed_job_yields_topics() {
    let server = MockServer::start().await;
    mock_submit(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/topics/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "complete",
            "topics": [{"id": 0, "label": "crashes", "words": ["crash", "panic"]}],
        })))
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let payload = client
        .discover_topics(&[issue_with_title(1, "crash on startup")], TextField::Title)
        .expect("discovery should succeed")
        .expect("payload should be present");

    assert_eq!(payload["status"], "complete");
    assert_eq!(payload["document_count"], 1);
    assert_eq!(payload["topics"][0]["label"], "crashes");
}

#[tokio::test]
async fn exhausted_poll_budget_reports_processing() {
    let server = MockServer::start().await;
    mock_submit(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/topics/jobs/job-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "processing"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let payload = client
        .discover_topics(&[issue_with_title(1, "crash")], TextField::Title)
        .expect("discovery should succeed")
        .expect("payload should be present");

    assert_eq!(payload["status"], "processing");
    assert_eq!(payload["job_id"], "job-1");
}

#[tokio::test]
async fn remote_error_is_data_not_err() {
    let server = MockServer::start().await;
    mock_submit(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/topics/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "message": "model unavailable",
        })))
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let payload = client
        .discover_topics(&[issue_with_title(1, "crash")], TextField::Title)
        .expect("discovery should succeed")
        .expect("payload should be present");

    assert_eq!(payload["status"], "error");
    assert_eq!(payload["message"], "model unavailable");
}

#[tokio::test]
async fn no_documents_means_no_payload() {
    let server = MockServer::start().await;

    let client = test_client(&server, 2);
    let payload = client
        .discover_topics(&[issue_with_title(1, "   ")], TextField::Body)
        .expect("discovery should succeed");

    assert!(payload.is_none());
}

#[tokio::test]
async fn submit_failure_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/topics/submit"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let result = client.discover_topics(&[issue_with_title(1, "crash")], TextField::Title);

    assert!(result.is_err());
}
