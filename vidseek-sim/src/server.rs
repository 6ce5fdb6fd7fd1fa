//! HTTP server hosting any number of simulated catalog sources.
//!
//! Every source lives under `/{source_id}` and answers the usual
//! `api.php/provide/vod` search and detail calls. Behavior per source is
//! deterministic for a given seed: delays, failure injection, payload code
//! variants and page sizes are all configured up front.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use vidseek_core::SourceDescriptor;

use crate::catalog::{CatalogEntry, create_default_catalog};

/// Errors starting the simulated server.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Failed to bind simulated catalog server: {reason}")]
    Bind { reason: String },
}

/// How a simulated source answers.
#[derive(Debug, Clone, PartialEq)]
pub enum SimBehavior {
    /// Normal answers
    Healthy,
    /// Answers 503 with the given probability
    Flaky { failure_rate: f64 },
    /// Always answers 500
    ServerError,
    /// Never answers
    Hang,
    /// Answers 200 with a failure code in the payload
    FailureCode { code: i64, message: String },
    /// Answers 200 with a body that is not JSON
    Malformed,
}

/// Configuration of one simulated source.
#[derive(Debug, Clone)]
pub struct SimSource {
    pub id: String,
    pub seed: u64,
    pub response_delay: Duration,
    pub behavior: SimBehavior,
    pub page_size: usize,
    /// Code reported on success; upstreams use 1 or 200
    pub success_code: i64,
    pub catalog: Vec<CatalogEntry>,
}

impl SimSource {
    /// Healthy source with the default catalog.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            seed: 42,
            response_delay: Duration::from_millis(20),
            behavior: SimBehavior::Healthy,
            page_size: 20,
            success_code: 1,
            catalog: create_default_catalog(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    pub fn with_behavior(mut self, behavior: SimBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_failure_rate(self, rate: f64) -> Self {
        self.with_behavior(SimBehavior::Flaky {
            failure_rate: rate.clamp(0.0, 1.0),
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_success_code(mut self, code: i64) -> Self {
        self.success_code = code;
        self
    }

    pub fn with_catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replaces the catalog with numbered titles.
    pub fn with_titles(self, titles: &[&str]) -> Self {
        let catalog = titles
            .iter()
            .enumerate()
            .map(|(index, title)| CatalogEntry::new(index as u64 + 1, *title))
            .collect();
        self.with_catalog(catalog)
    }
}

struct SourceState {
    config: SimSource,
    rng: Mutex<ChaCha8Rng>,
    search_requests: Mutex<Vec<u32>>,
    detail_requests: Mutex<usize>,
}

/// Set of simulated sources served by one server.
#[derive(Default)]
pub struct SimulatedCatalog {
    sources: HashMap<String, SourceState>,
    order: Vec<String>,
}

impl SimulatedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source; a later source with the same id replaces the earlier one.
    pub fn with_source(mut self, source: SimSource) -> Self {
        let id = source.id.clone();
        if !self.sources.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.sources.insert(
            id,
            SourceState {
                rng: Mutex::new(ChaCha8Rng::seed_from_u64(source.seed)),
                config: source,
                search_requests: Mutex::new(Vec::new()),
                detail_requests: Mutex::new(0),
            },
        );
        self
    }

    /// A mix of healthy, slow, flaky and broken sources for manual testing.
    pub fn demo() -> Self {
        Self::new()
            .with_source(SimSource::new("fast").with_page_size(5))
            .with_source(
                SimSource::new("slow")
                    .with_seed(7)
                    .with_response_delay(Duration::from_millis(1500))
                    .with_success_code(200),
            )
            .with_source(SimSource::new("flaky").with_seed(3).with_failure_rate(0.5))
            .with_source(SimSource::new("broken").with_behavior(SimBehavior::ServerError))
            .with_source(SimSource::new("stalled").with_behavior(SimBehavior::Hang))
    }

    /// Source ids in insertion order.
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct VodQuery {
    #[serde(default)]
    wd: Option<String>,
    #[serde(default)]
    pg: Option<String>,
    #[serde(default)]
    ids: Option<String>,
}

async fn provide_vod(
    State(catalog): State<Arc<SimulatedCatalog>>,
    Path(source_id): Path<String>,
    Query(params): Query<VodQuery>,
) -> Response {
    let Some(state) = catalog.sources.get(&source_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let config = &state.config;
    let page = params
        .pg
        .as_deref()
        .and_then(|pg| pg.parse::<u32>().ok())
        .unwrap_or(1)
        .max(1);

    if params.ids.is_some() {
        *state.detail_requests.lock() += 1;
    } else {
        state.search_requests.lock().push(page);
    }

    tokio::time::sleep(config.response_delay).await;

    match &config.behavior {
        SimBehavior::Healthy => {}
        SimBehavior::Flaky { failure_rate } => {
            if state.rng.lock().random_bool(*failure_rate) {
                tracing::debug!(source = %source_id, "Simulated upstream failure");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        }
        SimBehavior::ServerError => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        SimBehavior::Hang => {
            std::future::pending::<()>().await;
        }
        SimBehavior::FailureCode { code, message } => {
            return Json(json!({ "code": code, "msg": message })).into_response();
        }
        SimBehavior::Malformed => return "<html>maintenance</html>".into_response(),
    }

    if let Some(ids) = params.ids {
        return detail_response(state, &ids);
    }
    search_response(state, params.wd.as_deref().unwrap_or(""), page)
}

fn search_response(state: &SourceState, query: &str, page: u32) -> Response {
    let config = &state.config;
    let needle = query.trim().to_lowercase();
    let matches: Vec<&CatalogEntry> = config
        .catalog
        .iter()
        .filter(|entry| needle.is_empty() || entry.title.to_lowercase().contains(&needle))
        .collect();

    let page_count = matches.len().div_ceil(config.page_size).max(1);
    let start = (page as usize - 1) * config.page_size;
    let mut rng = state.rng.lock();
    let list: Vec<serde_json::Value> = matches
        .iter()
        .skip(start)
        .take(config.page_size)
        .map(|entry| entry.to_list_item(&mut rng, false))
        .collect();

    Json(json!({
        "code": config.success_code,
        "msg": "ok",
        "page": page,
        "pagecount": page_count.to_string(),
        "limit": config.page_size,
        "total": matches.len(),
        "list": list,
    }))
    .into_response()
}

fn detail_response(state: &SourceState, ids: &str) -> Response {
    let config = &state.config;
    let mut rng = state.rng.lock();
    let list: Vec<serde_json::Value> = ids
        .split(',')
        .filter_map(|id| id.trim().parse::<u64>().ok())
        .filter_map(|id| config.catalog.iter().find(|entry| entry.id == id))
        .map(|entry| entry.to_list_item(&mut rng, true))
        .collect();

    Json(json!({
        "code": config.success_code,
        "msg": "ok",
        "list": list,
    }))
    .into_response()
}

/// Running simulated catalog server. Aborted on drop.
pub struct SimServer {
    address: SocketAddr,
    catalog: Arc<SimulatedCatalog>,
    handle: JoinHandle<()>,
}

impl SimServer {
    /// Serves `catalog` on an ephemeral local port.
    ///
    /// # Errors
    ///
    /// - `SimError::Bind` - If no local port can be bound
    pub async fn spawn(catalog: SimulatedCatalog) -> Result<Self, SimError> {
        Self::spawn_on("127.0.0.1:0", catalog).await
    }

    /// Serves `catalog` on `bind`.
    ///
    /// # Errors
    ///
    /// - `SimError::Bind` - If the address cannot be bound
    pub async fn spawn_on(bind: &str, catalog: SimulatedCatalog) -> Result<Self, SimError> {
        let listener = TcpListener::bind(bind).await.map_err(|e| SimError::Bind {
            reason: e.to_string(),
        })?;
        let address = listener.local_addr().map_err(|e| SimError::Bind {
            reason: e.to_string(),
        })?;

        let catalog = Arc::new(catalog);
        let app = Router::new()
            .route("/{source_id}/api.php/provide/vod/", get(provide_vod))
            .route("/{source_id}/api.php/provide/vod", get(provide_vod))
            .with_state(catalog.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Simulated catalog server stopped");
            }
        });
        tracing::info!(%address, sources = catalog.order.len(), "Simulated catalog server started");

        Ok(Self {
            address,
            catalog,
            handle,
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Base URL of one simulated source.
    pub fn base_url(&self, source_id: &str) -> String {
        format!("http://{}/{source_id}", self.address)
    }

    /// Descriptor pointing at one simulated source.
    pub fn descriptor(&self, source_id: &str) -> SourceDescriptor {
        SourceDescriptor::new(source_id, self.base_url(source_id))
    }

    /// Descriptors for every source, in insertion order.
    pub fn descriptors(&self) -> Vec<SourceDescriptor> {
        self.catalog
            .source_ids()
            .map(|id| self.descriptor(id))
            .collect()
    }

    /// Pages requested from a source's search endpoint, in arrival order.
    pub fn search_requests(&self, source_id: &str) -> Vec<u32> {
        self.catalog
            .sources
            .get(source_id)
            .map(|state| state.search_requests.lock().clone())
            .unwrap_or_default()
    }

    /// Number of detail requests a source received.
    pub fn detail_requests(&self, source_id: &str) -> usize {
        self.catalog
            .sources
            .get(source_id)
            .map(|state| *state.detail_requests.lock())
            .unwrap_or(0)
    }
}

impl Drop for SimServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fetch_json(url: String) -> (u16, serde_json::Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status().as_u16();
        let body = response.text().await.unwrap();
        (status, serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_search_pages_through_matches() {
        let server = SimServer::spawn(
            SimulatedCatalog::new().with_source(
                SimSource::new("a")
                    .with_response_delay(Duration::ZERO)
                    .with_page_size(2)
                    .with_titles(&["Inception", "Inception 2", "Inception 3", "Other"]),
            ),
        )
        .await
        .unwrap();
        let url = server.descriptor("a").search_url("inception", 2);

        let (status, body) = fetch_json(url).await;

        assert_eq!(status, 200);
        assert_eq!(body["code"], 1);
        assert_eq!(body["pagecount"], "2");
        assert_eq!(body["list"].as_array().unwrap().len(), 1);
        assert_eq!(body["list"][0]["vod_name"], "Inception 3");
        assert_eq!(server.search_requests("a"), vec![2]);
    }

    #[tokio::test]
    async fn test_detail_includes_play_groups() {
        let server = SimServer::spawn(
            SimulatedCatalog::new().with_source(
                SimSource::new("a")
                    .with_response_delay(Duration::ZERO)
                    .with_success_code(200),
            ),
        )
        .await
        .unwrap();

        let (_, found) = fetch_json(server.descriptor("a").detail_url("15")).await;
        let (_, missing) = fetch_json(server.descriptor("a").detail_url("999")).await;

        assert_eq!(found["code"], 200);
        assert_eq!(found["list"][0]["vod_play_from"], "web$$$sim_m3u8");
        assert!(missing["list"].as_array().unwrap().is_empty());
        assert_eq!(server.detail_requests("a"), 2);
    }

    #[tokio::test]
    async fn test_failure_behaviors() {
        let server = SimServer::spawn(
            SimulatedCatalog::new()
                .with_source(SimSource::new("down").with_behavior(SimBehavior::ServerError))
                .with_source(SimSource::new("banned").with_behavior(SimBehavior::FailureCode {
                    code: -1,
                    message: "banned".to_string(),
                })),
        )
        .await
        .unwrap();

        let (down, _) = fetch_json(server.descriptor("down").search_url("x", 1)).await;
        let (banned, body) = fetch_json(server.descriptor("banned").search_url("x", 1)).await;
        let (unknown, _) = fetch_json(server.descriptor("nope").search_url("x", 1)).await;

        assert_eq!(down, 500);
        assert_eq!(banned, 200);
        assert_eq!(body["code"], -1);
        assert_eq!(unknown, 404);
    }

    #[tokio::test]
    async fn test_same_seed_gives_same_payload() {
        let catalog = || {
            SimulatedCatalog::new()
                .with_source(SimSource::new("a").with_seed(9).with_response_delay(Duration::ZERO))
        };
        let first = SimServer::spawn(catalog()).await.unwrap();
        let second = SimServer::spawn(catalog()).await.unwrap();

        let (_, one) = fetch_json(first.descriptor("a").search_url("", 1)).await;
        let (_, two) = fetch_json(second.descriptor("a").search_url("", 1)).await;

        assert_eq!(one, two);
        assert_eq!(one["list"].as_array().unwrap().len(), 15);
    }
}
