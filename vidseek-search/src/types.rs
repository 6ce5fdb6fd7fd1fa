//! Data types for search requests, videos and details.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use vidseek_core::SourceDescriptor;

use crate::errors::SearchError;

/// One catalog entry, normalized from whatever shape its source returned.
///
/// Created once by the executor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Owning source id
    pub source: String,
    /// Latency of the fetch that produced this record, in milliseconds
    #[serde(default)]
    pub latency: u64,
}

impl VideoRecord {
    /// Minimal record with only the required fields.
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            picture: None,
            remarks: None,
            year: None,
            area: None,
            actor: None,
            director: None,
            synopsis: None,
            language: None,
            type_name: None,
            source: source.into(),
            latency: 0,
        }
    }
}

/// Incoming search request as the caller sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// Request that passed validation; the orchestrator only accepts these.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// Trimmed, non-empty query
    pub query: String,
    /// Enabled sources, highest priority first
    pub sources: Vec<SourceDescriptor>,
    /// First page to fetch from every source
    pub page: u32,
}

impl SearchRequest {
    /// Creates a request for page 1.
    pub fn new(query: impl Into<String>, sources: Vec<SourceDescriptor>) -> Self {
        Self {
            query: query.into(),
            sources,
            page: None,
        }
    }

    /// Sets the starting page.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Checks the request and prepares it for fan-out.
    ///
    /// Disabled sources are dropped; the remaining ones are ordered by
    /// descending priority, keeping the caller's order for ties.
    ///
    /// # Errors
    ///
    /// - `SearchError::Validation` - Empty query, no sources, duplicate
    ///   source ids, or no enabled source
    pub fn validate(self) -> Result<ValidatedRequest, SearchError> {
        let query = self.query.trim().to_string();
        if query.is_empty() {
            return Err(validation("query must not be empty"));
        }
        if self.sources.is_empty() {
            return Err(validation("at least one source is required"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(validation(format!("duplicate source id '{}'", source.id)));
            }
        }

        let mut sources: Vec<SourceDescriptor> = self
            .sources
            .into_iter()
            .filter(|source| source.enabled)
            .collect();
        if sources.is_empty() {
            return Err(validation("all sources are disabled"));
        }
        sources.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(ValidatedRequest {
            query,
            sources,
            page: self.page.unwrap_or(1).max(1),
        })
    }
}

fn validation(reason: impl Into<String>) -> SearchError {
    SearchError::Validation {
        reason: reason.into(),
    }
}

/// One playable episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub name: String,
    pub url: String,
}

/// Full information for one video from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetail {
    pub video: VideoRecord,
    /// Code of the play group the episodes come from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_group: Option<String>,
    /// Codes of every play group the source offered
    #[serde(default)]
    pub available_groups: Vec<String>,
    pub episodes: Vec<Episode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str) -> SourceDescriptor {
        SourceDescriptor::new(id, format!("http://{id}.example"))
    }

    #[test]
    fn test_validate_trims_query_and_defaults_page() {
        let validated = SearchRequest::new("  Inception ", vec![source("a")])
            .validate()
            .unwrap();

        assert_eq!(validated.query, "Inception");
        assert_eq!(validated.page, 1);
    }

    #[test]
    fn test_validate_rejects_blank_query() {
        let err = SearchRequest::new("   ", vec![source("a")])
            .validate()
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Invalid search request: query must not be empty"
        );
    }

    #[test]
    fn test_validate_rejects_empty_and_duplicate_sources() {
        assert!(SearchRequest::new("x", vec![]).validate().is_err());
        assert!(
            SearchRequest::new("x", vec![source("a"), source("a")])
                .validate()
                .is_err()
        );
        assert!(
            SearchRequest::new("x", vec![source("a").disabled()])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_orders_by_priority() {
        let validated = SearchRequest::new(
            "x",
            vec![
                source("a"),
                source("b").with_priority(5),
                source("c").disabled(),
                source("d"),
            ],
        )
        .with_page(0)
        .validate()
        .unwrap();

        let ids: Vec<&str> = validated.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "d"]);
        assert_eq!(validated.page, 1);
    }

    #[test]
    fn test_video_record_wire_shape() {
        let mut video = VideoRecord::new("1", "Inception", "a");
        video.type_name = Some("Movie".to_string());
        video.latency = 120;

        let json = serde_json::to_value(&video).unwrap();

        assert_eq!(json["type"], "Movie");
        assert_eq!(json["source"], "a");
        assert_eq!(json["latency"], 120);
        assert!(json.get("picture").is_none());
    }
}
