//! Vidseek Search - streaming fan-out search across video catalogs

#![deny(clippy::missing_errors_doc)]
#![warn(clippy::too_many_lines)]
//!
//! Queries many independent catalog sources concurrently and streams
//! partial results as they arrive. The server side is the
//! [`SearchOrchestrator`]; the client side is the [`StreamConsumer`], which
//! filters, scores and ranks what the stream delivers.

pub mod consumer;
pub mod detail;
pub mod errors;
pub mod executor;
pub mod normalize;
pub mod orchestrator;
pub mod protocol;
pub mod ranking;
pub mod types;

// Re-export main types
pub use consumer::{CompletionReason, SearchView, StreamConsumer};
pub use detail::DetailFetcher;
pub use errors::{DetailError, FetchError, ProtocolError, SearchError};
pub use executor::{PageFetcher, PageResult, SourceExecutor};
pub use orchestrator::SearchOrchestrator;
pub use protocol::{SseDecoder, StreamEvent, encode_sse, parse_event};
pub use ranking::{ResultSet, ScoredVideo, SortOrder};
pub use types::{Episode, SearchRequest, ValidatedRequest, VideoDetail, VideoRecord};

/// Convenience type alias for Results with SearchError.
pub type Result<T> = std::result::Result<T, SearchError>;
