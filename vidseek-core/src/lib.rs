//! Vidseek Core - shared building blocks for multi-source video search
//!
//! This crate provides the pieces every other Vidseek crate leans on:
//! source descriptors and the source registry, the retry/timeout wrapper used
//! for every upstream call, the HTTP network layer, configuration and
//! tracing setup.

pub mod config;
pub mod network;
pub mod retry;
pub mod source;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::VidseekConfig;
pub use network::{HttpError, HttpResponse, NetworkLayer, ProductionNetworkLayer};
pub use retry::{AttemptError, RetryExhausted, RetryPolicy, RetryStrategy, Retryable, Settled};
pub use source::{RegistryError, SourceDescriptor, SourceRegistry};

/// Top-level errors that can bubble up from Vidseek setup code.
///
/// Request-scoped failures (fetches, detail lookups, protocol parsing) have
/// their own error types in `vidseek-search`; this enum covers process
/// level concerns such as configuration and the source registry.
#[derive(Debug, thiserror::Error)]
pub enum VidseekError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VidseekError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            VidseekError::Registry(e) => match e {
                RegistryError::DuplicateId { id } => {
                    format!("Source '{id}' is listed more than once")
                }
                RegistryError::InvalidBaseUrl { id, .. } => {
                    format!("Source '{id}' has an invalid base URL")
                }
                _ => "Could not load the source list".to_string(),
            },
            VidseekError::Configuration { .. } => "Configuration error occurred".to_string(),
            VidseekError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            VidseekError::Configuration { .. }
                | VidseekError::Registry(RegistryError::DuplicateId { .. })
                | VidseekError::Registry(RegistryError::InvalidBaseUrl { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, VidseekError>;
