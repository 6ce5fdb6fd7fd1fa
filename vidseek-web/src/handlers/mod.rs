//! HTTP request handlers organized by functionality

pub mod api;
pub mod search;

// Re-export handler functions
pub use api::{DetailBody, SourceRef, SourcesQuery, api_detail, api_sources, health};
pub use search::{SearchBody, search_stream};
