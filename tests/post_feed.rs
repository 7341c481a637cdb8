use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use uptime_tracker::{ManualClock, PostFeed, TrackerError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn posts_json() -> serde_json::Value {
    json!([
        {"title": "Tracing in async Rust", "permalink": "/posts/tracing/", "summary": "Spans and subscribers", "tags": ["rust", "observability"]},
        {"title": "Sourdough notes", "permalink": "/posts/sourdough/", "summary": "Hydration experiments", "tags": ["baking"]},
        {"title": "Rust error handling", "permalink": "/posts/errors/", "summary": "Result all the way down", "tags": ["rust"]},
        {"title": "Weekend hike", "permalink": "/posts/hike/", "summary": "Trail report", "tags": []},
        {"title": "Pagination math", "permalink": "/posts/pages/", "summary": "Ceil division, again", "tags": ["web"]}
    ])
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()))
}

fn feed(server: &MockServer, clock: Arc<ManualClock>) -> PostFeed {
    PostFeed::new(
        format!("{}/index.json", server.uri()),
        Duration::from_secs(300),
        Duration::from_secs(2),
        clock,
    )
    .unwrap()
}

#[tokio::test]
async fn paging_and_search_share_one_fetch_within_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(posts_json()))
        .expect(1)
        .mount(&server)
        .await;

    let feed = feed(&server, clock());

    let first = feed.page(1, 2).await.unwrap();
    assert_eq!(first.total_items, 5);
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].title, "Tracing in async Rust");

    let last = feed.page(3, 2).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].permalink, "/posts/pages/");

    let rust = feed.search("RUST", 1, 10).await.unwrap();
    assert_eq!(rust.total_items, 2);

    let baking = feed.search("baking", 1, 10).await.unwrap();
    assert_eq!(baking.items[0].title, "Sourdough notes");

    let everything = feed.search("  ", 1, 10).await.unwrap();
    assert_eq!(everything.total_items, 5);
}

#[tokio::test]
async fn refetches_after_ttl_expires() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(posts_json()))
        .expect(2)
        .mount(&server)
        .await;

    let clock = clock();
    let feed = feed(&server, clock.clone());

    feed.page(1, 10).await.unwrap();
    clock.advance(chrono::Duration::seconds(301));
    feed.page(1, 10).await.unwrap();
}

#[tokio::test]
async fn upstream_error_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.json"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = feed(&server, clock()).page(1, 10).await;
    assert!(matches!(result, Err(TrackerError::Fetch(_))));
}

#[tokio::test]
async fn malformed_feed_propagates_json_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let result = feed(&server, clock()).page(1, 10).await;
    assert!(matches!(result, Err(TrackerError::Json(_))));
}

#[tokio::test]
async fn failed_refetch_after_ttl_returns_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(posts_json()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/index.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let clock = clock();
    let feed = feed(&server, clock.clone());

    assert_eq!(feed.page(1, 10).await.unwrap().total_items, 5);

    clock.advance(chrono::Duration::minutes(10));
    assert!(matches!(feed.page(1, 10).await, Err(TrackerError::Fetch(_))));

    feed.refresh().await;
    assert!(feed.page(1, 10).await.is_err());
}
