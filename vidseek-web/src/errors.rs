//! Error types for the web server.

use thiserror::Error;
use vidseek_core::RegistryError;

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum WebError {
    #[error("Failed to bind {address}: {reason}")]
    Bind { address: String, reason: String },

    #[error("Server failed: {reason}")]
    Serve { reason: String },

    #[error("Upstream client setup failed: {reason}")]
    Client { reason: String },

    #[error("Source registry error: {0}")]
    Registry(#[from] RegistryError),
}
