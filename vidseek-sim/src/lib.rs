//! Vidseek Simulation - deterministic upstream catalogs for testing

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! Serves any number of fake catalog sources from one local HTTP server so
//! searches can be exercised end to end without touching real upstreams.
//! Same seed, same payloads.

pub mod catalog;
pub mod server;

pub use catalog::{CatalogEntry, create_default_catalog};
pub use server::{SimBehavior, SimError, SimServer, SimSource, SimulatedCatalog};
