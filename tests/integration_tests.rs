#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests for the caching pipeline: fetch, derive, index, search,
// and query against mocked upstream services.

use serde_json::{Value, json};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use repolens::cache::{ArtifactKind, CacheService, Source};
use repolens::config::{AtlasConfig, CacheConfig, Config, EmbeddingConfig, GithubConfig};
use repolens::database::sqlite::models::ScopedQueryOutcome;

struct TestSetup {
    _temp_dir: TempDir,
    service: CacheService,
    github: MockServer,
    embeddings: MockServer,
}

async fn create_test_setup() -> TestSetup {
    let temp_dir = TempDir::new().expect("can create temp directory");
    let github = MockServer::start().await;
    let embeddings = MockServer::start().await;
    let atlas = MockServer::start().await;

    let config = Config {
        github: GithubConfig {
            api_url: Url::parse(&github.uri()).expect("mock URI parses"),
            token: None,
        },
        embedding: EmbeddingConfig {
            api_url: Url::parse(&embeddings.uri()).expect("mock URI parses"),
            api_key: None,
            model: "test-model".to_string(),
            dimension: 4,
        },
        atlas: AtlasConfig {
            api_url: Url::parse(&atlas.uri()).expect("mock URI parses"),
            api_key: None,
            poll_interval_secs: 1,
            max_polls: 1,
        },
        cache: CacheConfig::default(),
        base_dir: temp_dir.path().to_path_buf(),
    };

    let service = CacheService::new(config)
        .await
        .expect("can create cache service");

    TestSetup {
        _temp_dir: temp_dir,
        service,
        github,
        embeddings,
    }
}

/// A raw GitHub issue element, as the issues endpoint returns it.
fn raw_issue(id: i64, number: i64, title: &str, body: &str, state: &str) -> Value {
    json!({
        "id": id,
        "number": number,
        "title": title,
        "body": body,
        "state": state,
        "user": {"login": "octocat"},
        "comments": 2,
        "labels": [{"name": "bug"}],
        "created_at": "2024-03-05T12:00:00Z",
        "updated_at": "2024-03-06T12:00:00Z",
        "closed_at": null,
        "html_url": format!("https://github.com/owner/repo/issues/{number}"),
    })
}

async fn mock_issues(server: &MockServer, issues: Value) {
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issues))
        .expect(1)
        .mount(server)
        .await;
}

async fn mock_embedding(server: &MockServer, input: &str, vector: Vec<f32>) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": [input]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": [{"embedding": vector}]})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_and_derive_workflow() {
    let setup = create_test_setup().await;
    mock_issues(
        &setup.github,
        json!([
            raw_issue(1, 1, "parser panics on empty input", "stack trace attached", "open"),
            raw_issue(2, 2, "timeout connecting to registry", "network flakiness", "closed"),
        ]),
    )
    .await;

    // First read hits the API; the artifact derives from the cached batch
    // without a second fetch.
    let issues = setup
        .service
        .issues("owner/repo", false)
        .await
        .expect("can fetch issues");
    assert_eq!(issues.source, Source::Api);
    assert_eq!(issues.data.as_array().map(Vec::len), Some(2));

    let insights = setup
        .service
        .artifact("owner/repo", ArtifactKind::Insights, false)
        .await
        .expect("can derive insights");
    assert_eq!(insights.source, Source::Generated);
    assert_eq!(insights.data["total_issues"], 2);
    assert_eq!(insights.data["states"]["open"], 1);

    let again = setup
        .service
        .artifact("owner/repo", ArtifactKind::Insights, false)
        .await
        .expect("can serve cached insights");
    assert_eq!(again.source, Source::Cache);

    let status = setup
        .service
        .cache_status("owner/repo")
        .await
        .expect("can read cache status");
    assert_eq!(status["issues"]["cached"], true);
    assert_eq!(status["artifacts"]["insights"]["cached"], true);
}

#[tokio::test]
async fn index_and_search_workflow() {
    let setup = create_test_setup().await;
    mock_issues(
        &setup.github,
        json!([
            raw_issue(1, 1, "parser panics on empty input", "stack trace attached", "open"),
            raw_issue(2, 2, "docs typo in readme", "small fix", "closed"),
        ]),
    )
    .await;
    mock_embedding(
        &setup.embeddings,
        "parser panics on empty input\n\nstack trace attached",
        vec![1.0, 0.0, 0.0, 0.0],
    )
    .await;
    mock_embedding(
        &setup.embeddings,
        "docs typo in readme\n\nsmall fix",
        vec![0.0, 1.0, 0.0, 0.0],
    )
    .await;
    mock_embedding(&setup.embeddings, "panic in the parser", vec![0.9, 0.1, 0.0, 0.0]).await;

    let outcome = setup
        .service
        .index_issues("owner/repo", false)
        .await
        .expect("can index issues");
    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.embedded, 2);

    let matches = setup
        .service
        .similarity_search("owner/repo", "panic in the parser", 1)
        .await
        .expect("can search");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].issue.issue_number, 1);
}

#[tokio::test]
async fn scoped_query_workflow() {
    let setup = create_test_setup().await;
    mock_issues(
        &setup.github,
        json!([
            raw_issue(1, 1, "first", "a", "open"),
            raw_issue(2, 2, "second", "b", "closed"),
            raw_issue(3, 3, "third", "c", "closed"),
        ]),
    )
    .await;
    for (text, axis) in [("first\n\na", 0), ("second\n\nb", 1), ("third\n\nc", 2)] {
        let mut vector = vec![0.0; 4];
        vector[axis] = 1.0;
        mock_embedding(&setup.embeddings, text, vector).await;
    }

    setup
        .service
        .index_issues("owner/repo", false)
        .await
        .expect("can index issues");

    let outcome = setup
        .service
        .scoped_query(
            "owner/repo",
            "SELECT state, COUNT(*) AS n FROM issues GROUP BY state ORDER BY state",
        )
        .await
        .expect("can run scoped query");

    let ScopedQueryOutcome::Rows(rows) = outcome else {
        panic!("expected rows, got an error outcome");
    };
    assert_eq!(rows.columns, vec!["state", "n"]);
    assert_eq!(rows.rows, vec![
        vec![json!("closed"), json!(2)],
        vec![json!("open"), json!(1)],
    ]);

    let rejected = setup.service.scoped_query("owner/repo", "DELETE FROM issues").await;
    assert!(rejected.is_err());
}

#[tokio::test]
async fn clear_workflow() {
    let setup = create_test_setup().await;
    mock_issues(&setup.github, json!([raw_issue(1, 1, "only issue", "body", "open")])).await;
    mock_embedding(&setup.embeddings, "only issue\n\nbody", vec![1.0, 0.0, 0.0, 0.0]).await;

    setup
        .service
        .index_issues("owner/repo", false)
        .await
        .expect("can index issues");

    let removed = setup
        .service
        .clear("owner/repo")
        .await
        .expect("can clear repository");
    assert_eq!(removed, 1);

    let status = setup
        .service
        .cache_status("owner/repo")
        .await
        .expect("can read cache status");
    assert_eq!(status["issues"]["present"], false);
    assert_eq!(status["indexed_issues"], 0);
}
