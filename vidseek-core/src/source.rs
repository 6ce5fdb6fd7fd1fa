//! Source descriptors and the source registry.
//!
//! A source is one upstream catalog API that follows the common
//! search/detail convention. Descriptors are supplied by the caller per
//! request, or picked from the registry loaded at server start.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default search path template
pub const DEFAULT_SEARCH_PATH: &str = "/api.php/provide/vod/?ac=detail&wd={query}&pg={page}";

/// Default detail path template
pub const DEFAULT_DETAIL_PATH: &str = "/api.php/provide/vod/?ac=detail&ids={id}";

/// One upstream catalog API and how to reach it.
///
/// Path templates accept `{query}` and `{id}` (URL-encoded on expansion)
/// and `{page}`. A template that is already an absolute URL replaces the
/// base URL entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub base_url: String,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    #[serde(default = "default_detail_path")]
    pub detail_path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

fn default_search_path() -> String {
    DEFAULT_SEARCH_PATH.to_string()
}

fn default_detail_path() -> String {
    DEFAULT_DETAIL_PATH.to_string()
}

fn default_enabled() -> bool {
    true
}

impl SourceDescriptor {
    /// Creates an enabled descriptor with the default path templates.
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            base_url: base_url.into(),
            search_path: default_search_path(),
            detail_path: default_detail_path(),
            headers: BTreeMap::new(),
            enabled: true,
            priority: 0,
            group: None,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the dispatch priority (higher goes first).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the group tag.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Adds a request header sent with every call to this source.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Marks the source disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Name for display, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Expands the search template for `query` and `page`.
    pub fn search_url(&self, query: &str, page: u32) -> String {
        let path = self
            .search_path
            .replace("{query}", &urlencoding::encode(query))
            .replace("{page}", &page.to_string());
        self.join(&path)
    }

    /// Expands the detail template for a video id.
    pub fn detail_url(&self, video_id: &str) -> String {
        let path = self
            .detail_path
            .replace("{id}", &urlencoding::encode(video_id));
        self.join(&path)
    }

    fn join(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Errors raised while loading or validating the source registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read source list {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse source list: {reason}")]
    Parse { reason: String },

    #[error("Duplicate source id '{id}'")]
    DuplicateId { id: String },

    #[error("Invalid base URL for source '{id}': {reason}")]
    InvalidBaseUrl { id: String, reason: String },
}

/// Known sources, in the order they were configured.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    /// Validates and wraps a list of descriptors.
    ///
    /// # Errors
    ///
    /// - `RegistryError::DuplicateId` - Two descriptors share an id
    /// - `RegistryError::InvalidBaseUrl` - A base URL does not parse
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.id.as_str()) {
                return Err(RegistryError::DuplicateId {
                    id: source.id.clone(),
                });
            }
            url::Url::parse(&source.base_url).map_err(|e| RegistryError::InvalidBaseUrl {
                id: source.id.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(Self { sources })
    }

    /// Parses a JSON array of descriptors.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Parse` - Malformed JSON
    /// - Any validation error from [`SourceRegistry::new`]
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let sources: Vec<SourceDescriptor> =
            serde_json::from_str(json).map_err(|e| RegistryError::Parse {
                reason: e.to_string(),
            })?;
        Self::new(sources)
    }

    /// Loads the registry from a JSON file.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Io` - File cannot be read
    /// - Any error from [`SourceRegistry::from_json`]
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|e| RegistryError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let registry = Self::from_json(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = registry.len(),
            enabled = registry.enabled().count(),
            "Loaded source registry"
        );
        Ok(registry)
    }

    /// Enabled sources, highest priority first (stable for ties).
    pub fn enabled(&self) -> impl Iterator<Item = &SourceDescriptor> {
        let mut enabled: Vec<&SourceDescriptor> =
            self.sources.iter().filter(|source| source.enabled).collect();
        enabled.sort_by(|a, b| b.priority.cmp(&a.priority));
        enabled.into_iter()
    }

    /// Enabled sources carrying `group`.
    pub fn enabled_in_group<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = &'a SourceDescriptor> + 'a {
        self.enabled()
            .filter(move |source| source.group.as_deref() == Some(group))
    }

    /// Looks up a source by id, enabled or not.
    pub fn find(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|source| source.id == id)
    }

    /// Number of configured sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns true if no sources are configured.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_search_url_expansion() {
        let source = SourceDescriptor::new("a", "https://api.example.com/");

        assert_eq!(
            source.search_url("the matrix", 2),
            "https://api.example.com/api.php/provide/vod/?ac=detail&wd=the%20matrix&pg=2"
        );
        assert_eq!(
            source.detail_url("42"),
            "https://api.example.com/api.php/provide/vod/?ac=detail&ids=42"
        );
    }

    #[test]
    fn test_builder_fields_survive_json() {
        let source = SourceDescriptor::new("a", "https://a.example")
            .with_name("Source A")
            .with_header("Referer", "https://a.example/");

        assert_eq!(source.display_name(), "Source A");
        assert_eq!(SourceDescriptor::new("b", "https://b.example").display_name(), "b");

        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["baseUrl"], "https://a.example");
        assert_eq!(json["headers"]["Referer"], "https://a.example/");
        assert!(json.get("group").is_none());

        let parsed: SourceDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, source);
    }

    #[test]
    fn test_absolute_template_overrides_base() {
        let mut source = SourceDescriptor::new("a", "https://api.example.com");
        source.search_path = "https://mirror.example.com/s?q={query}".to_string();

        assert_eq!(
            source.search_url("x", 1),
            "https://mirror.example.com/s?q=x"
        );
    }

    #[test]
    fn test_descriptor_defaults_from_json() {
        let source: SourceDescriptor =
            serde_json::from_str(r#"{"id":"a","baseUrl":"http://localhost:1"}"#).unwrap();

        assert!(source.enabled);
        assert_eq!(source.priority, 0);
        assert_eq!(source.search_path, DEFAULT_SEARCH_PATH);
        assert_eq!(source.display_name(), "a");
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let result = SourceRegistry::new(vec![
            SourceDescriptor::new("a", "http://one.example"),
            SourceDescriptor::new("a", "http://two.example"),
        ]);

        assert!(matches!(result, Err(RegistryError::DuplicateId { id }) if id == "a"));
    }

    #[test]
    fn test_registry_rejects_bad_base_url() {
        let result = SourceRegistry::new(vec![SourceDescriptor::new("a", "not a url")]);

        assert!(matches!(result, Err(RegistryError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_enabled_sorted_by_priority() {
        let registry = SourceRegistry::new(vec![
            SourceDescriptor::new("low", "http://low.example"),
            SourceDescriptor::new("off", "http://off.example")
                .with_priority(100)
                .disabled(),
            SourceDescriptor::new("high", "http://high.example")
                .with_priority(10)
                .with_group("movies"),
            SourceDescriptor::new("low2", "http://low2.example"),
        ])
        .unwrap();

        let ids: Vec<&str> = registry.enabled().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low", "low2"]);

        let grouped: Vec<&str> = registry
            .enabled_in_group("movies")
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(grouped, vec!["high"]);
        assert!(registry.find("off").is_some());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"a","baseUrl":"http://a.example","group":"tv"}},
                {{"id":"b","baseUrl":"http://b.example","enabled":false}}]"#
        )
        .unwrap();

        let registry = SourceRegistry::load(file.path()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.enabled().count(), 1);
    }
}
