//! Search API server for Vidseek
//!
//! One streaming endpoint fans a query out to every requested source and
//! relays the session events as server-sent events; the remaining
//! endpoints are plain JSON.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use vidseek_core::{NetworkLayer, ProductionNetworkLayer, SourceRegistry, VidseekConfig};
use vidseek_search::{DetailFetcher, SearchOrchestrator, SourceExecutor};

use crate::errors::WebError;
use crate::handlers::{api_detail, api_sources, health, search_stream};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SourceRegistry>,
    pub orchestrator: SearchOrchestrator,
    pub detail: DetailFetcher,
    pub server_started_at: Instant,
}

impl AppState {
    /// Wires search and detail over an arbitrary network layer.
    pub fn new(
        config: &VidseekConfig,
        registry: SourceRegistry,
        network: Arc<dyn NetworkLayer>,
    ) -> Self {
        let policy = config.network.retry_policy();
        let executor = SourceExecutor::new(network.clone(), policy.clone());

        Self {
            registry: Arc::new(registry),
            orchestrator: SearchOrchestrator::new(Arc::new(executor), config.session.clone()),
            detail: DetailFetcher::new(network, policy),
            server_started_at: Instant::now(),
        }
    }

    /// Wires search and detail over a production HTTP client.
    ///
    /// # Errors
    ///
    /// - `WebError::Client` - If the HTTP client cannot be built
    pub fn from_config(config: &VidseekConfig, registry: SourceRegistry) -> Result<Self, WebError> {
        let network = ProductionNetworkLayer::new(
            config.network.user_agent,
            config.network.attempt_timeout,
        )
        .map_err(|e| WebError::Client {
            reason: e.to_string(),
        })?;
        Ok(Self::new(config, registry, Arc::new(network)))
    }
}

/// Builds the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/search/stream", post(search_stream))
        .route("/api/detail", post(api_detail))
        .route("/api/sources", get(api_sources))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `bind` and serves `state` in a background task.
///
/// Returns the bound address, which matters when binding port 0.
///
/// # Errors
///
/// - `WebError::Bind` - If the address cannot be bound
pub async fn spawn_server(
    bind: &str,
    state: AppState,
) -> Result<(SocketAddr, JoinHandle<Result<(), WebError>>), WebError> {
    let listener = TcpListener::bind(bind).await.map_err(|e| WebError::Bind {
        address: bind.to_string(),
        reason: e.to_string(),
    })?;
    let address = listener.local_addr().map_err(|e| WebError::Bind {
        address: bind.to_string(),
        reason: e.to_string(),
    })?;

    let app = build_router(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.map_err(|e| WebError::Serve {
            reason: e.to_string(),
        })
    });

    Ok((address, handle))
}

/// Loads the registry, binds the configured address and serves until the
/// server fails.
///
/// # Errors
///
/// - `WebError::Registry` - If the sources file cannot be loaded
/// - `WebError::Client` - If the HTTP client cannot be built
/// - `WebError::Bind` / `WebError::Serve` - If serving fails
pub async fn run_server(config: VidseekConfig) -> Result<(), WebError> {
    let registry = match &config.server.sources_file {
        Some(path) => SourceRegistry::load(path)?,
        None => {
            tracing::warn!("No sources file configured; requests must list their sources");
            SourceRegistry::default()
        }
    };

    let state = AppState::from_config(&config, registry)?;
    let (address, handle) = spawn_server(&config.server.bind, state).await?;
    tracing::info!("Vidseek search server running on http://{address}");

    handle.await.map_err(|e| WebError::Serve {
        reason: e.to_string(),
    })?
}
