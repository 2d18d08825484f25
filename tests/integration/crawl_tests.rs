//! Integration tests for the crawler
//!
//! These tests use wiremock to serve Reddit-shaped JSON and run full crawl
//! sessions against an on-disk database.

use serde_json::{json, Value};
use tempfile::TempDir;
use threadline::client::RedditClient;
use threadline::config::{
    ClientConfig, Config, CrawlerConfig, FeedEntry, OutputConfig, RetryConfig,
};
use threadline::crawler::{run_crawl, Coordinator, SessionReport, Shutdown};
use threadline::storage::{
    open_storage, CheckpointStore, ContentStore, SessionLog, SessionStatus, SqliteStorage,
    Statistics,
};
use threadline::ThreadlineError;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASE_TIME: f64 = 1_700_000_000.0;

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            session_limit: 100,
            batch_size: 5,
            min_item_delay: 0,
            max_item_delay: 0,
            min_feed_delay: 0,
            max_feed_delay: 0,
            excluded_authors: vec!["AutoModerator".to_string()],
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay: 1,
        },
        client: ClientConfig {
            base_url: base_url.to_string(),
            user_agent: "threadline-tests/0.1".to_string(),
            page_size: 2,
            timeout: 5,
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        feeds: vec![FeedEntry {
            name: "rust".to_string(),
            session_limit: None,
        }],
    }
}

fn link(id: &str, offset: f64, body: &str) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "subreddit": "rust",
            "author": "op",
            "title": format!("Post {}", id),
            "created_utc": BASE_TIME + offset,
            "selftext": body,
            "num_comments": 0,
            "score": 10,
            "upvote_ratio": 0.95,
            "over_18": false
        }
    })
}

fn comment(id: &str, parent: &str, author: &str) -> Value {
    json!({
        "kind": "t1",
        "data": {
            "id": id,
            "parent_id": parent,
            "author": author,
            "body": format!("comment {}", id),
            "created_utc": BASE_TIME + 5000.0,
            "score": 1,
            "replies": ""
        }
    })
}

fn listing(children: Vec<Value>, after: Option<&str>) -> Value {
    json!({
        "kind": "Listing",
        "data": { "after": after, "children": children }
    })
}

fn comment_page(item: Value, comments: Vec<Value>) -> Value {
    json!([listing(vec![item], None), listing(comments, None)])
}

async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

struct Harness {
    server: MockServer,
    config: Config,
    storage: SqliteStorage,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("threadline.db");
        let config = create_test_config(&server.uri(), db_path.to_str().unwrap());
        let storage = open_storage(&db_path, config.crawler.batch_size).unwrap();

        Self {
            server,
            config,
            storage,
            _dir: dir,
        }
    }

    async fn crawl(&mut self, limit: usize) -> Result<SessionReport, ThreadlineError> {
        let client = RedditClient::new(&self.config.client).unwrap();
        Coordinator::new(
            &client,
            &mut self.storage,
            &self.config,
            Shutdown::never(),
            "test-hash",
        )
        .run("rust", limit)
        .await
    }
}

#[tokio::test]
async fn test_full_crawl_with_stub_expansion() {
    let mut h = Harness::new().await;

    mount_json(
        &h.server,
        "/r/rust/new.json",
        listing(vec![link("a", 200.0, "hello"), link("b", 100.0, "")], None),
    )
    .await;

    mount_json(
        &h.server,
        "/comments/a.json",
        comment_page(
            link("a", 200.0, "hello"),
            vec![
                comment("c1", "t3_a", "alice"),
                comment("c2", "t3_a", "bob"),
                json!({
                    "kind": "more",
                    "data": {
                        "id": "m1",
                        "parent_id": "t3_a",
                        "children": ["c3", "c4", "c5"],
                        "count": 3
                    }
                }),
            ],
        ),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/api/morechildren.json"))
        .and(query_param("link_id", "t3_a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "json": {
                "errors": [],
                "data": {
                    "things": [
                        comment("c3", "t3_a", "carol"),
                        comment("c4", "t3_a", "dave"),
                        comment("c5", "t3_a", "erin")
                    ]
                }
            }
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let report = h.crawl(100).await.unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.items_processed, 2);
    assert_eq!(report.items_empty, 1);
    assert_eq!(report.written.replies_written, 5);

    assert!(h.storage.has_item("a").unwrap());
    assert!(!h.storage.has_item("b").unwrap());
    assert_eq!(h.storage.count_replies_for("a").unwrap(), 5);

    let checkpoint = h.storage.get_checkpoint("rust").unwrap();
    assert_eq!(checkpoint.newest_processed_at.timestamp(), 1_700_000_200);
    assert!(checkpoint.backlog.is_none());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let mut h = Harness::new().await;

    mount_json(
        &h.server,
        "/r/rust/new.json",
        listing(vec![link("a", 200.0, "hello")], None),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/comments/a.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(comment_page(
            link("a", 200.0, "hello"),
            vec![comment("c1", "t3_a", "alice")],
        )))
        .expect(1)
        .mount(&h.server)
        .await;

    h.crawl(100).await.unwrap();
    let checkpoint = h.storage.get_checkpoint("rust").unwrap();

    let second = h.crawl(100).await.unwrap();

    assert_eq!(second.items_processed, 0);
    assert_eq!(h.storage.count_items().unwrap(), 1);
    assert_eq!(h.storage.count_replies().unwrap(), 1);
    assert_eq!(h.storage.get_checkpoint("rust").unwrap(), checkpoint);
    assert_eq!(h.storage.recent_sessions(10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_limited_session_resumes_on_next_page() {
    let mut h = Harness::new().await;

    // Most specific mock first: the first matching mock wins
    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .and(query_param("after", "t3_p3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(
            vec![link("p2", 200.0, "two"), link("p1", 100.0, "one")],
            None,
        )))
        .mount(&h.server)
        .await;

    mount_json(
        &h.server,
        "/r/rust/new.json",
        listing(
            vec![link("p4", 400.0, "four"), link("p3", 300.0, "three")],
            Some("t3_p3"),
        ),
    )
    .await;

    for (id, offset) in [("p4", 400.0), ("p3", 300.0), ("p2", 200.0), ("p1", 100.0)] {
        Mock::given(method("GET"))
            .and(path(format!("/comments/{}.json", id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(comment_page(link(id, offset, "body"), vec![])),
            )
            .expect(1)
            .mount(&h.server)
            .await;
    }

    let first = h.crawl(2).await.unwrap();
    assert_eq!(first.items_processed, 2);
    assert!(h.storage.has_item("p3").unwrap());
    assert!(!h.storage.has_item("p2").unwrap());

    let second = h.crawl(100).await.unwrap();
    assert_eq!(second.items_processed, 2);
    assert_eq!(h.storage.count_items().unwrap(), 4);

    let checkpoint = h.storage.get_checkpoint("rust").unwrap();
    assert_eq!(checkpoint.newest_processed_at.timestamp(), 1_700_000_400);
    assert!(checkpoint.backlog.is_none());
}

#[tokio::test]
async fn test_exhausted_retries_skip_only_that_item() {
    let mut h = Harness::new().await;

    mount_json(
        &h.server,
        "/r/rust/new.json",
        listing(
            vec![link("bad", 200.0, "broken"), link("good", 100.0, "fine")],
            None,
        ),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/comments/bad.json"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&h.server)
        .await;

    mount_json(
        &h.server,
        "/comments/good.json",
        comment_page(link("good", 100.0, "fine"), vec![]),
    )
    .await;

    let report = h.crawl(100).await.unwrap();

    assert_eq!(report.items_failed, 1);
    assert!(!h.storage.has_item("bad").unwrap());
    assert!(h.storage.has_item("good").unwrap());
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let mut h = Harness::new().await;

    mount_json(
        &h.server,
        "/r/rust/new.json",
        listing(vec![link("a", 200.0, "hello")], None),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/comments/a.json"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;

    mount_json(
        &h.server,
        "/comments/a.json",
        comment_page(
            link("a", 200.0, "hello"),
            vec![comment("c1", "t3_a", "alice")],
        ),
    )
    .await;

    let report = h.crawl(100).await.unwrap();

    assert_eq!(report.items_failed, 0);
    assert_eq!(h.storage.count_replies_for("a").unwrap(), 1);
}

#[tokio::test]
async fn test_unauthorized_feed_fails_session() {
    let mut h = Harness::new().await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h.crawl(100).await;

    assert!(matches!(result, Err(ThreadlineError::FeedPage { .. })));
    assert!(h.storage.get_checkpoint("rust").unwrap().is_initial());
    let session = h.storage.recent_sessions(1).unwrap().remove(0);
    assert_eq!(session.status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_run_crawl_continues_after_failed_feed() {
    let mut h = Harness::new().await;
    h.config.feeds = vec![
        FeedEntry {
            name: "broken".to_string(),
            session_limit: None,
        },
        FeedEntry {
            name: "rust".to_string(),
            session_limit: Some(1),
        },
    ];

    Mock::given(method("GET"))
        .and(path("/r/broken/new.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;

    mount_json(
        &h.server,
        "/r/rust/new.json",
        listing(vec![link("a", 200.0, "hello"), link("b", 100.0, "hi")], None),
    )
    .await;

    mount_json(
        &h.server,
        "/comments/a.json",
        comment_page(link("a", 200.0, "hello"), vec![]),
    )
    .await;

    let client = RedditClient::new(&h.config.client).unwrap();
    let feeds = h.config.feeds.clone();
    let outcomes = run_crawl(
        &h.config,
        &feeds,
        &client,
        &mut h.storage,
        Shutdown::never(),
        "test-hash",
    )
    .await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].result.is_err());
    let report = outcomes[1].result.as_ref().unwrap();
    assert_eq!(report.items_processed, 1);
    assert!(h.storage.has_item("a").unwrap());
    assert!(!h.storage.has_item("b").unwrap());
}
