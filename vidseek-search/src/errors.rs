//! Error types for search sessions, upstream fetches and the wire protocol.

use thiserror::Error;

/// Errors that end a search session before any fetch starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    /// The request cannot be served as given.
    #[error("Invalid search request: {reason}")]
    Validation {
        /// What was wrong with the request
        reason: String,
    },
}

/// Failure of one page fetch from one source.
///
/// These never leave the orchestrator; they are logged and counted as an
/// empty contribution.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Every attempt hit the per-attempt deadline.
    #[error("Source '{source_id}' timed out after {attempts} attempt(s)")]
    TimedOut {
        /// Source that timed out
        source_id: String,
        /// Attempts made
        attempts: u32,
    },

    /// Transport failure or non-success HTTP status.
    #[error("Source '{source_id}' request failed: {reason}")]
    Network {
        /// Source that failed
        source_id: String,
        /// Underlying failure
        reason: String,
    },

    /// The upstream answered with a failure code in its payload.
    #[error("Source '{source_id}' reported code {code}: {message}")]
    Upstream {
        /// Source that reported the failure
        source_id: String,
        /// Reported code
        code: i64,
        /// Reported message, if any
        message: String,
    },

    /// The payload could not be understood.
    #[error("Source '{source_id}' returned an unreadable payload: {reason}")]
    Parse {
        /// Source whose payload failed to parse
        source_id: String,
        /// Parser error
        reason: String,
    },

    /// The fetch task itself crashed.
    #[error("Fetch task for source '{source_id}' crashed")]
    TaskFailed {
        /// Source whose task crashed
        source_id: String,
    },
}

impl FetchError {
    /// Source the failure belongs to.
    pub fn source_id(&self) -> &str {
        match self {
            FetchError::TimedOut { source_id, .. }
            | FetchError::Network { source_id, .. }
            | FetchError::Upstream { source_id, .. }
            | FetchError::Parse { source_id, .. }
            | FetchError::TaskFailed { source_id } => source_id,
        }
    }
}

/// Failure of the single-video detail fetch.
///
/// Both variants share the `DETAIL_FAILED` kind and are never retried by
/// callers; the retry budget was already applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetailError {
    /// The source no longer serves this title; another source should be tried.
    #[error("Source '{source_id}' no longer serves video '{video_id}'")]
    NotFound {
        /// Source that was asked
        source_id: String,
        /// Requested video id
        video_id: String,
    },

    /// Any other failure.
    #[error("Detail fetch from source '{source_id}' failed: {reason}")]
    Failed {
        /// Source that was asked
        source_id: String,
        /// Underlying failure
        reason: String,
    },
}

impl DetailError {
    /// Machine-readable kind shared by all detail failures.
    pub const KIND: &'static str = "DETAIL_FAILED";

    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        Self::KIND
    }

    /// Source the failure belongs to.
    pub fn source_id(&self) -> &str {
        match self {
            DetailError::NotFound { source_id, .. } | DetailError::Failed { source_id, .. } => {
                source_id
            }
        }
    }

    /// Returns true if the source does not have the title.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DetailError::NotFound { .. })
    }
}

/// Errors decoding the event stream on the client side.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// A data line did not hold a valid event.
    #[error("Malformed event payload: {reason}")]
    Malformed {
        /// Parser error
        reason: String,
    },
}
