//! Vidseek Web - JSON and event-stream API server

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! Exposes the streaming search endpoint plus detail, source listing and
//! health endpoints for frontends and the `vidseek` CLI.

pub mod errors;
pub mod handlers;
pub mod server;

// Re-export main types
pub use errors::WebError;
pub use server::{AppState, build_router, run_server, spawn_server};
