//! Streaming search endpoint

use std::convert::Infallible;

use axum::extract::{Json, State};
use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use vidseek_core::SourceDescriptor;
use vidseek_search::{SearchRequest, StreamEvent};

use crate::server::AppState;

/// Search request body.
///
/// Without `sources`, the registry's enabled sources are searched,
/// optionally narrowed to `group`.
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub sources: Option<Vec<SourceDescriptor>>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub group: Option<String>,
}

/// Streams one search session as server-sent events.
///
/// Validation failures arrive as a single `error` event, not as an HTTP
/// error, so clients handle every outcome on the same channel. No
/// keep-alive comments are sent.
pub async fn search_stream(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let sources = match body.sources {
        Some(sources) => sources,
        None => match body.group.as_deref() {
            Some(group) => state.registry.enabled_in_group(group).cloned().collect(),
            None => state.registry.enabled().cloned().collect(),
        },
    };

    let mut request = SearchRequest::new(body.query, sources);
    request.page = body.page;
    tracing::debug!(
        query = %request.query,
        sources = request.sources.len(),
        "Search stream requested"
    );

    let events = state.orchestrator.stream(request).map(|event| Ok(to_sse(&event)));
    Sse::new(events)
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        tracing::error!(kind = event.kind(), error = %e, "Failed to encode event");
        Event::default().data(r#"{"type":"error","message":"event encoding failed"}"#)
    })
}
