//! Client-side consumption of live search streams.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use axum::routing::post;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use vidseek_core::VidseekConfig;
use vidseek_search::{
    CompletionReason, ResultSet, SortOrder, StreamConsumer, StreamEvent, encode_sse,
};
use vidseek_sim::{SimBehavior, SimSource, SimulatedCatalog};

use crate::harness::{TestStack, consume};

#[tokio::test]
async fn test_consumer_ranks_and_completes() {
    let catalog = SimulatedCatalog::new()
        .with_source(
            SimSource::new("fast").with_titles(&["Making Inception", "Inception Redux", "Inception"]),
        )
        .with_source(
            SimSource::new("slow")
                .with_titles(&["Inception", "Inceptio", "Deception"])
                .with_response_delay(Duration::from_millis(200))
                .with_success_code(200),
        );
    let stack = TestStack::start(catalog, VidseekConfig::for_testing()).await;

    let view = stack
        .search_view(&stack.search_body("inception", &["fast", "slow"]))
        .await;

    assert_eq!(view.completion, Some(CompletionReason::Complete));
    assert!(view.completed);
    assert!(!view.loading);
    assert_eq!(view.total_sources, 2);
    assert_eq!(view.completed_sources, 2);

    // The sim filters by substring, so "Inceptio" and "Deception" never leave "slow".
    let titles: Vec<(&str, &str)> = view
        .videos
        .iter()
        .map(|scored| (scored.video.source.as_str(), scored.video.title.as_str()))
        .collect();
    assert_eq!(titles.len(), 4);
    assert_eq!(titles[0].1, "Inception");
    assert_eq!(titles[1].1, "Inception");
    assert!(view.videos.windows(2).all(|pair| pair[0].score >= pair[1].score));

    assert!(view.latencies.contains_key("fast"));
    assert!(view.latencies["slow"] >= 200);
}

#[tokio::test]
async fn test_recorded_session_replays_identically() {
    let catalog = SimulatedCatalog::new()
        .with_source(SimSource::new("a").with_page_size(3))
        .with_source(SimSource::new("b").with_seed(9));
    let stack = TestStack::start(catalog, VidseekConfig::for_testing()).await;

    let response = reqwest::Client::new()
        .post(stack.url("/api/search/stream"))
        .json(&stack.search_body("caminandes", &["a", "b"]))
        .send()
        .await
        .unwrap();
    let mut consumer = StreamConsumer::new(
        Box::pin(response.bytes_stream()),
        "caminandes",
        &stack.config.consumer,
    )
    .with_sort_order(SortOrder::Arrival);
    let view = consumer.run_to_end(|_| {}).await;

    assert_eq!(consumer.completion(), Some(&CompletionReason::Complete));
    let log = consumer.results().events().to_vec();
    assert!(log.first().is_some_and(|event| event.kind() == "start"));
    assert!(log.last().is_some_and(StreamEvent::is_terminal));

    let replayed = ResultSet::replay("caminandes", stack.config.consumer.min_similarity, log);
    assert_eq!(replayed.view(SortOrder::Arrival), view.videos);
    assert_eq!(replayed.latencies(), &view.latencies);
}

#[tokio::test]
async fn test_consumer_reports_server_error_event() {
    let catalog = SimulatedCatalog::new().with_source(SimSource::new("a"));
    let stack = TestStack::start(catalog, VidseekConfig::for_testing()).await;

    let view = stack.search_view(&json!({ "query": "Sintel", "sources": [] })).await;

    assert!(matches!(view.completion, Some(CompletionReason::ServerError(_))));
    assert!(view.videos.is_empty());
    assert!(!view.loading);
}

#[tokio::test]
async fn test_consumer_survives_failing_upstreams() {
    let catalog = SimulatedCatalog::new()
        .with_source(SimSource::new("ok"))
        .with_source(SimSource::new("down").with_behavior(SimBehavior::ServerError))
        .with_source(SimSource::new("banned").with_behavior(SimBehavior::FailureCode {
            code: -1,
            message: "blocked".to_string(),
        }));
    let stack = TestStack::start(catalog, VidseekConfig::for_testing()).await;

    let view = stack
        .search_view(&stack.search_body("Big Buck Bunny", &["ok", "down", "banned"]))
        .await;

    assert_eq!(view.completion, Some(CompletionReason::Complete));
    assert_eq!(view.completed_sources, 3);
    assert_eq!(view.videos.len(), 1);
    assert_eq!(view.videos[0].video.source, "ok");
}

/// Server that sends a start event and then goes silent without closing.
async fn spawn_stalled_stream() -> String {
    let start = encode_sse(&StreamEvent::Start { total_sources: 3 }).unwrap();
    let app = Router::new().route(
        "/api/search/stream",
        post(move || {
            let start = start.clone();
            async move {
                let body = stream::once(async move { Ok::<_, Infallible>(Bytes::from(start)) })
                    .chain(stream::pending());
                Response::builder()
                    .header(header::CONTENT_TYPE, "text/event-stream")
                    .body(Body::from_stream(body))
                    .unwrap()
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}/api/search/stream")
}

#[tokio::test]
async fn test_watchdog_ends_silent_stream() {
    let url = spawn_stalled_stream().await;
    let mut config = VidseekConfig::for_testing();
    config.consumer.watchdog = Duration::from_millis(300);

    let started = Instant::now();
    let view = consume(&url, &json!({ "query": "Sintel" }), &config).await;

    assert_eq!(view.completion, Some(CompletionReason::Watchdog));
    assert!(!view.loading);
    assert_eq!(view.total_sources, 3);
    assert!(started.elapsed() < Duration::from_secs(2));
}
