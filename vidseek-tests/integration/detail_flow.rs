//! Detail lookups and the read-only API surface.

use reqwest::StatusCode;
use serde_json::{Value, json};
use vidseek_core::VidseekConfig;
use vidseek_sim::{CatalogEntry, SimBehavior, SimSource, SimulatedCatalog};

use crate::harness::TestStack;

fn series_catalog() -> SimulatedCatalog {
    SimulatedCatalog::new()
        .with_source(SimSource::new("a").with_catalog(vec![
            CatalogEntry::new(1, "Caminandes").with_episodes(3),
            CatalogEntry::new(2, "Sintel"),
        ]))
        .with_source(SimSource::new("down").with_behavior(SimBehavior::ServerError))
}

async fn post_detail(stack: &TestStack, body: Value) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(stack.url("/api/detail"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_detail_prefers_m3u8_group() {
    let stack = TestStack::start(series_catalog(), VidseekConfig::for_testing()).await;

    let (status, body) = post_detail(&stack, json!({ "id": "1", "source": "a" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["video"]["title"], "Caminandes");
    assert_eq!(body["playGroup"], "sim_m3u8");
    assert_eq!(body["availableGroups"], json!(["web", "sim_m3u8"]));

    let episodes = body["episodes"].as_array().unwrap();
    assert_eq!(episodes.len(), 3);
    assert_eq!(episodes[0]["name"], "EP01");
    assert!(episodes[2]["url"].as_str().unwrap().ends_with("/1/3.m3u8"));
    assert_eq!(stack.sim.detail_requests("a"), 1);
}

#[tokio::test]
async fn test_detail_accepts_inline_descriptor() {
    let stack = TestStack::start(series_catalog(), VidseekConfig::for_testing()).await;
    let descriptor = stack.sim.descriptor("a");

    let (status, body) = post_detail(&stack, json!({ "id": "2", "source": descriptor })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["video"]["title"], "Sintel");
    assert_eq!(body["episodes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_detail_error_shapes() {
    let stack = TestStack::start(series_catalog(), VidseekConfig::for_testing()).await;

    let (status, body) = post_detail(&stack, json!({ "id": "999", "source": "a" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "DETAIL_FAILED");
    assert_eq!(body["error"]["source"], "a");
    assert_eq!(body["error"]["notFound"], true);

    let (status, body) = post_detail(&stack, json!({ "id": "1", "source": "down" })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["notFound"], false);

    let (status, _) = post_detail(&stack, json!({ "id": "1", "source": "nope" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sources_and_health_endpoints() {
    let catalog = SimulatedCatalog::new()
        .with_source(SimSource::new("a"))
        .with_source(SimSource::new("b"))
        .with_source(SimSource::new("off"));
    let stack = TestStack::start_with_registry(catalog, VidseekConfig::for_testing(), |sources| {
        sources
            .into_iter()
            .map(|source| match source.id.as_str() {
                "b" => source.with_group("anime"),
                "off" => source.disabled(),
                _ => source,
            })
            .collect()
    })
    .await;
    let client = reqwest::Client::new();

    let all: Value = client
        .get(stack.url("/api/sources"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["total"], 2);

    let anime: Value = client
        .get(stack.url("/api/sources?group=anime"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(anime["total"], 1);
    assert_eq!(anime["sources"][0]["id"], "b");

    let health: Value = client
        .get(stack.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sources"], 3);
}
