//! End-to-end pipeline tests against a mock archive.
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use waymark_core::*;

const INDEX_PATH: &str = "/cdx/search/cdx";

fn fast_retry() -> RetryPolicy {
    RetryPolicy { max_retries: 2, base_delay: Duration::from_millis(5) }
}

fn processor(server: &MockServer) -> Processor {
    let config = ProcessorConfig::builder()
        .index_endpoint(format!("{}{}", server.uri(), INDEX_PATH))
        .archive_base(server.uri())
        .pacing(Pacing::Sequential { delay: Duration::ZERO })
        .fetch(FetchConfig { retry: fast_retry(), ..Default::default() })
        .build();
    Processor::new(config).unwrap()
}

/// Index table from `(timestamp, original, digest)` rows.
fn index_body(rows: &[(&str, &str, &str)]) -> Value {
    let mut table = vec![json!(["timestamp", "original", "mimetype", "statuscode", "digest", "length"])];
    for (timestamp, original, digest) in rows {
        table.push(json!([timestamp, original, "text/html", "200", digest, "1024"]));
    }
    Value::Array(table)
}

async fn mount_index(server: &MockServer, domain: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(INDEX_PATH))
        .and(query_param("url", domain))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, timestamp: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path_regex(format!("^/web/{}id_/", timestamp)))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

fn page(title: &str) -> String {
    format!("<html><head><title>{}</title></head><body><h1>{}</h1></body></html>", title, title)
}

#[tokio::test]
async fn test_result_count_matches_index_rows() {
    let server = MockServer::start().await;
    mount_index(
        &server,
        "example.com",
        index_body(&[
            ("20240101000000", "http://example.com/", "AAA"),
            ("20240201000000", "http://example.com/", "BBB"),
            ("20240301000000", "http://example.com/", "CCC"),
        ]),
    )
    .await;
    mount_page(&server, "20240101000000", &page("January")).await;
    mount_page(&server, "20240201000000", &page("February")).await;
    mount_page(&server, "20240301000000", &page("March")).await;

    let result = processor(&server).process("example.com", &ProcessOptions::default()).await.unwrap();

    assert_eq!(result.domain, "example.com");
    assert!(result.category.is_none());
    let titles: Vec<&str> = result.snapshots.iter().map(|s| s.metadata.title.as_str()).collect();
    assert_eq!(titles, vec!["January", "February", "March"]);
    assert!(result.snapshots.iter().all(|s| s.metadata.heading_count == 1));
    assert!(result.snapshots[0].archive_url.ends_with("/web/20240101000000id_/http://example.com/"));
}

#[tokio::test]
async fn test_concurrent_pacing_keeps_index_order() {
    let server = MockServer::start().await;
    mount_index(
        &server,
        "example.com",
        index_body(&[
            ("20240101000000", "http://example.com/", "AAA"),
            ("20240201000000", "http://example.com/", "BBB"),
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path_regex("^/web/20240101000000id_/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page("Slow")).set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;
    mount_page(&server, "20240201000000", &page("Fast")).await;

    let config = ProcessorConfig::builder()
        .index_endpoint(format!("{}{}", server.uri(), INDEX_PATH))
        .archive_base(server.uri())
        .pacing(Pacing::Concurrent { limit: 2 })
        .fetch(FetchConfig { retry: fast_retry(), ..Default::default() })
        .build();
    let result = Processor::new(config)
        .unwrap()
        .process("example.com", &ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(result.snapshots[0].metadata.title, "Slow");
    assert_eq!(result.snapshots[1].metadata.title, "Fast");
}

/// Answers with a fixed template and records when each request arrived.
#[derive(Clone)]
struct Timed {
    template: ResponseTemplate,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Timed {
    fn new(template: ResponseTemplate) -> Self {
        Self { template, arrivals: Arc::new(Mutex::new(Vec::new())) }
    }

    fn arrivals(&self) -> Vec<Instant> {
        let mut arrivals = self.arrivals.lock().unwrap().clone();
        arrivals.sort();
        arrivals
    }
}

impl Respond for Timed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        self.template.clone()
    }
}

fn three_rows() -> Value {
    index_body(&[
        ("20240101000000", "http://example.com/", "AAA"),
        ("20240201000000", "http://example.com/", "BBB"),
        ("20240301000000", "http://example.com/", "CCC"),
    ])
}

#[tokio::test]
async fn test_sequential_pacing_delays_between_documents() {
    let server = MockServer::start().await;
    let index = Timed::new(ResponseTemplate::new(200).set_body_json(three_rows()));
    let pages = Timed::new(ResponseTemplate::new(200).set_body_string(page("Paced")));
    Mock::given(method("GET"))
        .and(path(INDEX_PATH))
        .respond_with(index.clone())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/web/"))
        .respond_with(pages.clone())
        .mount(&server)
        .await;

    let delay = Duration::from_millis(100);
    let config = ProcessorConfig::builder()
        .index_endpoint(format!("{}{}", server.uri(), INDEX_PATH))
        .archive_base(server.uri())
        .pacing(Pacing::Sequential { delay })
        .fetch(FetchConfig { retry: fast_retry(), ..Default::default() })
        .build();
    let processor = Processor::new(config).unwrap();

    let started = Instant::now();
    let result = processor.process("example.com", &ProcessOptions::default()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.snapshots.len(), 3);
    assert!(elapsed >= delay * 2, "finished after {:?}", elapsed);

    let index_at = index.arrivals()[0];
    let page_at = pages.arrivals();
    assert_eq!(page_at.len(), 3);
    // No pause before the index query or before the first document.
    assert!(index_at - started < delay);
    assert!(page_at[0] - index_at < delay);
    for pair in page_at.windows(2) {
        assert!(pair[1] - pair[0] >= delay);
    }
}

#[tokio::test]
async fn test_concurrent_pacing_caps_requests_in_flight() {
    let server = MockServer::start().await;
    mount_index(
        &server,
        "example.com",
        index_body(&[
            ("20240101000000", "http://example.com/", "AAA"),
            ("20240201000000", "http://example.com/", "BBB"),
            ("20240301000000", "http://example.com/", "CCC"),
            ("20240401000000", "http://example.com/", "DDD"),
            ("20240501000000", "http://example.com/", "EEE"),
        ]),
    )
    .await;
    let hold = Duration::from_millis(150);
    let pages = Timed::new(ResponseTemplate::new(200).set_body_string(page("Held")).set_delay(hold));
    Mock::given(method("GET"))
        .and(path_regex("^/web/"))
        .respond_with(pages.clone())
        .mount(&server)
        .await;

    let config = ProcessorConfig::builder()
        .index_endpoint(format!("{}{}", server.uri(), INDEX_PATH))
        .archive_base(server.uri())
        .pacing(Pacing::Concurrent { limit: 2 })
        .fetch(FetchConfig { retry: fast_retry(), ..Default::default() })
        .build();
    let result = Processor::new(config)
        .unwrap()
        .process("example.com", &ProcessOptions::default())
        .await
        .unwrap();
    assert_eq!(result.snapshots.len(), 5);
    assert!(result.snapshots.iter().all(|s| s.error.is_none()));

    // Each document is held for `hold`; requests arriving within one hold of
    // each other were in flight together.
    let arrivals = pages.arrivals();
    assert_eq!(arrivals.len(), 5);
    let peak = arrivals
        .iter()
        .map(|&at| arrivals.iter().filter(|&&other| other <= at && at - other < hold).count())
        .max()
        .unwrap();
    assert_eq!(peak, 2);
}

#[tokio::test]
async fn test_zero_count_requests_one_capture() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(INDEX_PATH))
        .and(query_param("limit", "-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(index_body(&[(
            "20240101000000",
            "http://example.com/",
            "AAA",
        )])))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "20240101000000", &page("Only")).await;

    let options = ProcessOptions { count: 0, ..Default::default() };
    let result = processor(&server).process("example.com", &options).await.unwrap();
    assert_eq!(result.snapshots.len(), 1);
}

#[tokio::test]
async fn test_zero_rows_yields_empty_result() {
    let server = MockServer::start().await;
    mount_index(&server, "empty.com", json!([])).await;
    mount_index(&server, "header-only.com", index_body(&[])).await;

    let processor = processor(&server);
    for domain in ["empty.com", "header-only.com"] {
        let result = processor.process(domain, &ProcessOptions::default()).await.unwrap();
        assert_eq!(result.domain, domain);
        assert!(result.snapshots.is_empty());
    }
}

#[tokio::test]
async fn test_snapshot_failure_is_isolated() {
    let server = MockServer::start().await;
    mount_index(
        &server,
        "example.com",
        index_body(&[
            ("20240101000000", "http://example.com/", "AAA"),
            ("20240201000000", "http://example.com/", "BBB"),
            ("20240301000000", "http://example.com/", "CCC"),
        ]),
    )
    .await;
    mount_page(&server, "20240101000000", &page("First")).await;
    Mock::given(method("GET"))
        .and(path_regex("^/web/20240201000000id_/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not archived"))
        .mount(&server)
        .await;
    mount_page(&server, "20240301000000", &page("Third")).await;

    let result = processor(&server).process("example.com", &ProcessOptions::default()).await.unwrap();

    assert_eq!(result.snapshots.len(), 3);
    assert_eq!(result.error_count(), 1);

    let failed = &result.snapshots[1];
    assert_eq!(failed.record.timestamp, "20240201000000");
    assert_eq!(failed.record.digest, "BBB");
    assert_eq!(failed.metadata, ExtractedMetadata::default());
    assert!(failed.error.as_deref().unwrap().contains("404"));

    assert_eq!(result.snapshots[0].metadata.title, "First");
    assert_eq!(result.snapshots[2].metadata.title, "Third");
    assert!(result.snapshots[2].error.is_none());
}

#[tokio::test]
async fn test_dedupe_drops_consecutive_digests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(INDEX_PATH))
        .and(query_param("collapse", "digest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(index_body(&[
            ("20240101000000", "http://example.com/", "AAA"),
            ("20240102000000", "http://example.com/", "AAA"),
            ("20240103000000", "http://example.com/", "BBB"),
            ("20240104000000", "http://example.com/", "BBB"),
            ("20240105000000", "http://example.com/", "AAA"),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/web/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page("Same")))
        .mount(&server)
        .await;

    let options = ProcessOptions { dedupe: true, ..Default::default() };
    let result = processor(&server).process("example.com", &options).await.unwrap();

    let digests: Vec<&str> = result.snapshots.iter().map(|s| s.record.digest.as_str()).collect();
    assert_eq!(digests, vec!["AAA", "BBB", "AAA"]);
    assert!(digests.windows(2).all(|w| w[0] != w[1]));
}

#[tokio::test]
async fn test_retries_service_unavailable_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("finally"))
        .expect(1)
        .mount(&server)
        .await;

    let base = Duration::from_millis(50);
    let fetcher = Fetcher::new(FetchConfig {
        retry: RetryPolicy { max_retries: 3, base_delay: base },
        ..Default::default()
    })
    .unwrap();
    let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();

    let started = Instant::now();
    let page = fetcher.fetch(&url, &FetchOptions::default()).await.unwrap();

    assert_eq!(page.status, 200);
    assert_eq!(page.body, "finally");
    assert!(started.elapsed() >= base + base * 2);
}

#[tokio::test]
async fn test_not_found_fails_after_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("x".repeat(500)))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
    let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
    let err = fetcher.fetch(&url, &FetchOptions::default()).await.unwrap_err();

    assert_eq!(err.url, url.to_string());
    assert_eq!(err.cause.status_code(), Some(404));
    match err.cause {
        FetchCause::Status { body, .. } => assert_eq!(body.chars().count(), 200),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_extra_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/with-header"))
        .and(header("x-request-source", "waymark-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
    let url = Url::parse(&format!("{}/with-header", server.uri())).unwrap();
    let options = FetchOptions::default().header("x-request-source", "waymark-tests");

    assert_eq!(fetcher.fetch(&url, &options).await.unwrap().body, "ok");
}

#[tokio::test]
async fn test_index_failure_is_domain_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(INDEX_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = processor(&server).process("down.com", &ProcessOptions::default()).await.unwrap_err();
    assert!(matches!(err, WaymarkError::Fetch(_)));
}

#[tokio::test]
async fn test_malformed_index_is_domain_error() {
    let server = MockServer::start().await;
    mount_index(&server, "odd.com", json!([["when", "where"], ["1", "2"]])).await;

    let err = processor(&server).process("odd.com", &ProcessOptions::default()).await.unwrap_err();
    assert!(matches!(err, WaymarkError::IndexFormat(_)));
}

async fn batch_server() -> MockServer {
    let server = MockServer::start().await;
    mount_index(&server, "a.com", index_body(&[("20240101000000", "http://a.com/", "AAA")])).await;
    mount_index(&server, "c.com", index_body(&[("20240202000000", "http://c.com/", "CCC")])).await;
    Mock::given(method("GET"))
        .and(path(INDEX_PATH))
        .and(query_param("url", "bad.com"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    mount_page(&server, "20240101000000", &page("A")).await;
    mount_page(&server, "20240202000000", &page("C")).await;
    server
}

#[tokio::test]
async fn test_batch_emits_progress_before_terminal() {
    let server = batch_server().await;
    let processor = processor(&server);
    let domains = vec!["c.com".to_string(), "bad.com".to_string(), "a.com".to_string()];

    let (tx, mut rx) = mpsc::channel(16);
    let summary = drive_batch(&processor, domains.clone(), &ProcessOptions::default(), tx).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(summary, BatchSummary { total: 3, successful: 2, failed: 1 });
    assert_eq!(events.len(), 6);
    assert_eq!(events.iter().filter(|e| !e.is_terminal()).count(), 3);

    for domain in &domains {
        let progress = events
            .iter()
            .position(|e| !e.is_terminal() && e.domain() == domain)
            .unwrap();
        let terminal = events.iter().position(|e| e.is_terminal() && e.domain() == domain).unwrap();
        assert!(progress < terminal, "{} finished before it started", domain);
    }

    let error = events
        .iter()
        .find(|e| matches!(e, StreamEvent::Error { .. }))
        .unwrap();
    assert_eq!(error.domain(), "bad.com");

    // The same events survive encoding and arbitrary re-chunking.
    let wire: String = events.iter().map(|e| e.to_line().unwrap()).collect();
    let mut decoder = LineDecoder::new();
    let mut decoded = Vec::new();
    for chunk in wire.as_bytes().chunks(7) {
        decoded.extend(decoder.push(chunk));
    }
    decoded.extend(decoder.finish());
    assert_eq!(decoded, events);
    assert_eq!(decoder.skipped(), 0);
}

#[tokio::test]
async fn test_run_bulk_sorts_by_domain() {
    let server = batch_server().await;
    let domains = vec!["c.com".to_string(), "bad.com".to_string(), "a.com".to_string()];

    let response = run_bulk(&processor(&server), domains, &ProcessOptions::default()).await;

    let names: Vec<&str> = response.data.iter().map(|d| d.domain.as_str()).collect();
    assert_eq!(names, vec!["a.com", "c.com"]);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].domain, "bad.com");
    assert!(response.errors[0].error.contains("403"));
    assert_eq!(response.meta, BatchSummary { total: 3, successful: 2, failed: 1 });
}

#[tokio::test]
async fn test_dropped_receiver_starts_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (tx, rx) = mpsc::channel(4);
    drop(rx);

    let summary = drive_batch(&processor(&server), vec!["a.com".to_string()], &ProcessOptions::default(), tx).await;
    assert_eq!(summary, BatchSummary { total: 1, successful: 0, failed: 0 });
}

async fn mount_chat(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(response)
        .mount(server)
        .await;
}

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    }))
}

fn classify_options(server: &MockServer) -> ProcessOptions {
    ProcessOptions {
        classify: true,
        remote: Some(RemoteClassifier::new("test-key").with_base_url(format!("{}/v1", server.uri()))),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_remote_label_takes_precedence() {
    let server = MockServer::start().await;
    mount_index(&server, "example.com", index_body(&[("20240101000000", "http://example.com/", "AAA")])).await;
    mount_page(&server, "20240101000000", &page("Welcome to our shop")).await;
    mount_chat(&server, chat_reply(" Gambling.")).await;

    let result = processor(&server).process("example.com", &classify_options(&server)).await.unwrap();

    assert_eq!(result.category.as_deref(), Some("clean"));
    let snapshot = &result.snapshots[0];
    assert_eq!(snapshot.category.as_deref(), Some("gambling"));
    assert_eq!(snapshot.suspicious, Some(true));
}

#[tokio::test]
async fn test_remote_reply_outside_vocabulary_is_suspect() {
    let server = MockServer::start().await;
    mount_index(&server, "example.com", index_body(&[("20240101000000", "http://example.com/", "AAA")])).await;
    mount_page(&server, "20240101000000", &page("Welcome")).await;
    mount_chat(&server, chat_reply("I think this is a bakery")).await;

    let result = processor(&server).process("example.com", &classify_options(&server)).await.unwrap();
    assert_eq!(result.snapshots[0].category.as_deref(), Some("suspect"));
}

#[tokio::test]
async fn test_remote_failure_keeps_heuristic_label() {
    let server = MockServer::start().await;
    mount_index(&server, "example.com", index_body(&[("20240101000000", "http://example.com/", "AAA")])).await;
    mount_page(&server, "20240101000000", &page("Online Casino Bonus")).await;
    mount_chat(&server, ResponseTemplate::new(500).set_body_string("overloaded")).await;

    let result = processor(&server).process("example.com", &classify_options(&server)).await.unwrap();

    let snapshot = &result.snapshots[0];
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.category.as_deref(), Some("gambling"));
    assert_eq!(snapshot.suspicious, Some(true));
}

#[tokio::test]
async fn test_remote_classifier_uses_supplied_client() {
    let server = MockServer::start().await;
    mount_index(
        &server,
        "example.com",
        index_body(&[
            ("20240101000000", "http://example.com/", "AAA"),
            ("20240201000000", "http://example.com/", "BBB"),
        ]),
    )
    .await;
    mount_page(&server, "20240101000000", &page("First")).await;
    mount_page(&server, "20240201000000", &page("Second")).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("user-agent", "shared-pool"))
        .respond_with(chat_reply("clean"))
        .expect(2)
        .mount(&server)
        .await;

    let client = reqwest::Client::builder().user_agent("shared-pool").build().unwrap();
    let options = ProcessOptions {
        classify: true,
        remote: Some(
            RemoteClassifier::new("test-key")
                .with_base_url(format!("{}/v1", server.uri()))
                .with_client(client),
        ),
        ..Default::default()
    };

    let result = processor(&server).process("example.com", &options).await.unwrap();
    assert!(result.snapshots.iter().all(|s| s.category.as_deref() == Some("clean")));
}

#[tokio::test]
async fn test_untitled_pages_are_not_classified() {
    let server = MockServer::start().await;
    mount_index(&server, "example.com", index_body(&[("20240101000000", "http://example.com/", "AAA")])).await;
    mount_page(&server, "20240101000000", "<html><body><h1>No title here</h1></body></html>").await;
    Mock::given(method("POST"))
        .respond_with(chat_reply("adult"))
        .expect(0)
        .mount(&server)
        .await;

    let result = processor(&server).process("example.com", &classify_options(&server)).await.unwrap();

    assert!(result.snapshots[0].category.is_none());
    assert!(result.snapshots[0].suspicious.is_none());
}

#[cfg(feature = "cleanup")]
#[tokio::test]
async fn test_keep_cleaned_html() {
    let server = MockServer::start().await;
    let archived = std::fs::read_to_string("../../tests/fixtures/archived_page.html").unwrap();
    mount_index(&server, "example-hardware.com", index_body(&[("20150101000000", "https://www.example-hardware.com/", "AAA")]))
        .await;
    mount_page(&server, "20150101000000", &archived).await;

    let config = ProcessorConfig::builder()
        .index_endpoint(format!("{}{}", server.uri(), INDEX_PATH))
        .archive_base(server.uri())
        .pacing(Pacing::Sequential { delay: Duration::ZERO })
        .keep_cleaned_html(true)
        .build();
    let result = Processor::new(config)
        .unwrap()
        .process("example-hardware.com", &ProcessOptions::default())
        .await
        .unwrap();

    let snapshot = &result.snapshots[0];
    assert_eq!(snapshot.metadata.heading_count, 2);
    let html = snapshot.html.as_deref().unwrap();
    assert!(!html.contains("wm-ipp"));
    assert!(html.contains("Spring sale"));
}
