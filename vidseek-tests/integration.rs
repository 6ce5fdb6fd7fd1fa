//! Integration tests for Vidseek
//!
//! These tests run the real search server against simulated catalog
//! sources over loopback HTTP and read the results back the way a client
//! does: through the SSE stream and the stream consumer.

#[path = "style.rs"]
mod style;

#[path = "integration/harness.rs"]
mod harness;

#[path = "integration/search_flow.rs"]
mod search_flow;

#[path = "integration/consumer_flow.rs"]
mod consumer_flow;

#[path = "integration/detail_flow.rs"]
mod detail_flow;
