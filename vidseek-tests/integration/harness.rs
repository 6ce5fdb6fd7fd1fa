//! Shared setup: a search server wired to a simulated catalog.

use std::net::SocketAddr;

use serde_json::Value;
use tokio::task::JoinHandle;
use vidseek_core::{SourceDescriptor, SourceRegistry, VidseekConfig};
use vidseek_search::{SearchView, SseDecoder, StreamConsumer, StreamEvent, parse_event};
use vidseek_sim::{SimServer, SimulatedCatalog};
use vidseek_web::{AppState, WebError, spawn_server};

/// Search server plus the simulated upstreams it talks to.
pub struct TestStack {
    pub sim: SimServer,
    pub address: SocketAddr,
    pub config: VidseekConfig,
    server: JoinHandle<Result<(), WebError>>,
}

impl Drop for TestStack {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl TestStack {
    /// Starts the stack with every simulated source in the registry.
    pub async fn start(catalog: SimulatedCatalog, config: VidseekConfig) -> Self {
        Self::start_with_registry(catalog, config, |descriptors| descriptors).await
    }

    /// Starts the stack, letting the caller shape the registry contents.
    pub async fn start_with_registry(
        catalog: SimulatedCatalog,
        config: VidseekConfig,
        registry: impl FnOnce(Vec<SourceDescriptor>) -> Vec<SourceDescriptor>,
    ) -> Self {
        let sim = SimServer::spawn(catalog).await.unwrap();
        let registry = SourceRegistry::new(registry(sim.descriptors())).unwrap();
        let state = AppState::from_config(&config, registry).unwrap();
        let (address, server) = spawn_server("127.0.0.1:0", state).await.unwrap();

        Self {
            sim,
            address,
            config,
            server,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.address)
    }

    /// Body naming the given simulated sources explicitly.
    pub fn search_body(&self, query: &str, source_ids: &[&str]) -> Value {
        let sources: Vec<SourceDescriptor> = source_ids
            .iter()
            .map(|id| self.sim.descriptor(id))
            .collect();
        serde_json::json!({ "query": query, "sources": sources })
    }

    /// Posts a search and collects every event until the server closes the stream.
    pub async fn search_events(&self, body: &Value) -> Vec<StreamEvent> {
        let text = reqwest::Client::new()
            .post(self.url("/api/search/stream"))
            .json(body)
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        let mut decoder = SseDecoder::new();
        let mut payloads = decoder.push(text.as_bytes());
        payloads.extend(decoder.finish());
        payloads
            .iter()
            .map(|payload| parse_event(payload).unwrap())
            .collect()
    }

    /// Posts a search and runs it through the stream consumer.
    pub async fn search_view(&self, body: &Value) -> SearchView {
        consume(&self.url("/api/search/stream"), body, &self.config).await
    }
}

/// Consumes the SSE response of `url` with the client-side consumer.
pub async fn consume(url: &str, body: &Value, config: &VidseekConfig) -> SearchView {
    let response = reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .unwrap();
    let query = body["query"].as_str().unwrap_or_default();

    let mut consumer = StreamConsumer::new(Box::pin(response.bytes_stream()), query, &config.consumer);
    consumer.run_to_end(|_| {}).await
}
