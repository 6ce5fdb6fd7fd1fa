//! JSON API handlers for detail lookup, source listing and health

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use vidseek_core::SourceDescriptor;
use vidseek_search::DetailError;

use crate::server::AppState;

/// Source named in a detail request: a registry id or a full descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceRef {
    Id(String),
    Descriptor(SourceDescriptor),
}

#[derive(Debug, Deserialize)]
pub struct DetailBody {
    pub id: String,
    pub source: SourceRef,
}

#[derive(Debug, Deserialize)]
pub struct SourcesQuery {
    pub group: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailErrorPayload<'a> {
    kind: &'static str,
    source: &'a str,
    message: String,
    not_found: bool,
}

fn detail_error(status: StatusCode, error: &DetailError) -> Response {
    let payload = DetailErrorPayload {
        kind: error.kind(),
        source: error.source_id(),
        message: error.to_string(),
        not_found: error.is_not_found(),
    };
    (status, Json(json!({ "error": payload }))).into_response()
}

/// Fetches the detail of one video from one source.
///
/// Answers 404 when the source no longer has the title, 400 for an unknown
/// source id and 502 for any other upstream failure.
pub async fn api_detail(State(state): State<AppState>, Json(body): Json<DetailBody>) -> Response {
    let source = match body.source {
        SourceRef::Descriptor(descriptor) => descriptor,
        SourceRef::Id(id) => match state.registry.find(&id) {
            Some(descriptor) => descriptor.clone(),
            None => {
                let error = DetailError::Failed {
                    source_id: id,
                    reason: "unknown source".to_string(),
                };
                return detail_error(StatusCode::BAD_REQUEST, &error);
            }
        },
    };

    match state.detail.fetch_detail(&source, &body.id).await {
        Ok(detail) => Json(detail).into_response(),
        Err(e) if e.is_not_found() => detail_error(StatusCode::NOT_FOUND, &e),
        Err(e) => detail_error(StatusCode::BAD_GATEWAY, &e),
    }
}

pub async fn api_sources(
    State(state): State<AppState>,
    Query(params): Query<SourcesQuery>,
) -> Json<serde_json::Value> {
    let sources: Vec<&SourceDescriptor> = match params.group.as_deref() {
        Some(group) => state.registry.enabled_in_group(group).collect(),
        None => state.registry.enabled().collect(),
    };

    Json(json!({
        "sources": sources,
        "total": sources.len()
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sources": state.registry.len(),
        "uptimeSecs": state.server_started_at.elapsed().as_secs()
    }))
}
