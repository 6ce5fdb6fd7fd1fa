//! End-to-end search sessions over the SSE endpoint.

use std::time::{Duration, Instant};

use serde_json::json;
use vidseek_core::VidseekConfig;
use vidseek_search::StreamEvent;
use vidseek_sim::{SimBehavior, SimSource, SimulatedCatalog};

use crate::harness::TestStack;

const INCEPTION_TITLES: [&str; 5] = [
    "Inception",
    "Inception: The Dream",
    "Inception Redux",
    "Making Inception",
    "Inception Extended",
];

#[tokio::test]
async fn test_healthy_and_broken_source() {
    let catalog = SimulatedCatalog::new()
        .with_source(SimSource::new("a").with_titles(&INCEPTION_TITLES))
        .with_source(SimSource::new("b").with_behavior(SimBehavior::ServerError));
    let stack = TestStack::start(catalog, VidseekConfig::for_testing()).await;

    let events = stack
        .search_events(&stack.search_body("Inception", &["a", "b"]))
        .await;

    assert_eq!(events.first(), Some(&StreamEvent::Start { total_sources: 2 }));
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Complete {
            total_videos_found: 5,
            total_sources: 2,
            max_page_count: 1,
        })
    );

    let batches: Vec<&StreamEvent> = events
        .iter()
        .filter(|event| matches!(event, StreamEvent::Videos { .. }))
        .collect();
    assert_eq!(batches.len(), 1);
    match batches[0] {
        StreamEvent::Videos {
            source,
            videos,
            total_sources,
            ..
        } => {
            assert_eq!(source, "a");
            assert_eq!(videos.len(), 5);
            assert_eq!(*total_sources, 2);
            assert!(videos.iter().all(|video| video.source == "a"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    let progress = events
        .iter()
        .filter(|event| matches!(event, StreamEvent::Progress { .. }))
        .count();
    assert_eq!(progress, 2);
    assert!(!events.iter().any(|event| matches!(event, StreamEvent::Error { .. })));
}

#[tokio::test]
async fn test_hanging_source_is_cut_off_by_retry_budget() {
    let catalog = SimulatedCatalog::new()
        .with_source(SimSource::new("s1").with_titles(&INCEPTION_TITLES))
        .with_source(SimSource::new("s2").with_titles(&INCEPTION_TITLES[..2]))
        .with_source(SimSource::new("s3").with_behavior(SimBehavior::Hang))
        .with_source(SimSource::new("s4").with_titles(&INCEPTION_TITLES[..1]))
        .with_source(SimSource::new("s5").with_behavior(SimBehavior::Malformed));
    let config = VidseekConfig::for_testing();
    let worst_case = config.network.retry_policy().worst_case_duration();
    let stack = TestStack::start(catalog, config).await;

    let started = Instant::now();
    let events = stack
        .search_events(&stack.search_body("Inception", &["s1", "s2", "s3", "s4", "s5"]))
        .await;
    let elapsed = started.elapsed();

    assert!(
        elapsed < worst_case + Duration::from_secs(1),
        "session took {elapsed:?}, retry budget is {worst_case:?}"
    );
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Complete {
            total_videos_found: 8,
            total_sources: 5,
            max_page_count: 1,
        })
    );
    assert!(!stack.sim.search_requests("s3").is_empty());
}

#[tokio::test]
async fn test_every_reported_page_is_fetched() {
    let titles: Vec<String> = (1..=7).map(|n| format!("Sintel Part {n}")).collect();
    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
    let catalog = SimulatedCatalog::new()
        .with_source(SimSource::new("paged").with_titles(&titles).with_page_size(2));
    let stack = TestStack::start(catalog, VidseekConfig::for_testing()).await;

    let events = stack
        .search_events(&stack.search_body("Sintel", &["paged"]))
        .await;

    let mut pages = stack.sim.search_requests("paged");
    pages.sort_unstable();
    assert_eq!(pages, vec![1, 2, 3, 4]);

    let mut batch_pages: Vec<u32> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Videos { page, .. } => Some(*page),
            _ => None,
        })
        .collect();
    batch_pages.sort_unstable();
    assert_eq!(batch_pages, vec![1, 2, 3, 4]);

    assert_eq!(
        events.last(),
        Some(&StreamEvent::Complete {
            total_videos_found: 7,
            total_sources: 1,
            max_page_count: 4,
        })
    );
}

#[tokio::test]
async fn test_page_fan_out_respects_cap_and_start_page() {
    let titles: Vec<String> = (1..=7).map(|n| format!("Sintel Part {n}")).collect();
    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
    let catalog = SimulatedCatalog::new()
        .with_source(SimSource::new("capped").with_titles(&titles).with_page_size(2))
        .with_source(SimSource::new("offset").with_titles(&titles).with_page_size(2));
    let mut config = VidseekConfig::for_testing();
    config.session.max_pages_per_source = Some(2);
    let stack = TestStack::start(catalog, config).await;

    let events = stack
        .search_events(&stack.search_body("Sintel", &["capped"]))
        .await;
    let mut pages = stack.sim.search_requests("capped");
    pages.sort_unstable();
    assert_eq!(pages, vec![1, 2]);
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Complete {
            total_videos_found: 4,
            max_page_count: 4,
            ..
        })
    ));

    let mut body = stack.search_body("Sintel", &["offset"]);
    body["page"] = json!(2);
    let events = stack.search_events(&body).await;
    assert_eq!(stack.sim.search_requests("offset"), vec![2]);
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Complete {
            total_videos_found: 2,
            ..
        })
    ));
}

#[tokio::test]
async fn test_invalid_request_yields_single_error_event() {
    let catalog = SimulatedCatalog::new().with_source(SimSource::new("a"));
    let stack = TestStack::start(catalog, VidseekConfig::for_testing()).await;

    let events = stack
        .search_events(&stack.search_body("   ", &["a"]))
        .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], StreamEvent::Error { message } if message.contains("query")));
    assert!(stack.sim.search_requests("a").is_empty());
}

#[tokio::test]
async fn test_registry_sources_used_when_body_omits_them() {
    let catalog = SimulatedCatalog::new()
        .with_source(SimSource::new("movies-a"))
        .with_source(SimSource::new("movies-b"))
        .with_source(SimSource::new("series-a"));
    let stack = TestStack::start_with_registry(catalog, VidseekConfig::for_testing(), |sources| {
        sources
            .into_iter()
            .map(|source| {
                let group = if source.id.starts_with("movies") {
                    "movies"
                } else {
                    "series"
                };
                source.with_group(group)
            })
            .collect()
    })
    .await;

    let events = stack
        .search_events(&json!({ "query": "Sintel", "group": "movies" }))
        .await;
    assert_eq!(events.first(), Some(&StreamEvent::Start { total_sources: 2 }));
    assert!(stack.sim.search_requests("series-a").is_empty());

    let events = stack.search_events(&json!({ "query": "Sintel" })).await;
    assert_eq!(events.first(), Some(&StreamEvent::Start { total_sources: 3 }));
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Complete {
            total_videos_found: 3,
            total_sources: 3,
            ..
        })
    ));
}
