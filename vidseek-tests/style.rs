//! Style Enforcement Tests
//!
//! Scans the workspace crates for patterns clippy does not catch.
//!
//! - `naming_conventions` - banned function prefixes, type suffixes and module names
//! - `dead_code_enforcement` - no #[allow(dead_code)] in production code

#[path = "style/naming_conventions.rs"]
mod naming_conventions;

#[path = "style/dead_code_enforcement.rs"]
mod dead_code_enforcement;
