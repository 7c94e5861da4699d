// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod dedup;
pub mod source_weights;
pub mod state;

// Fetch pipeline: canonical links, feed parsing, mirrors, parallel fetch
pub mod ingest;

// Ranking: scoring, near-duplicate clustering, diverse selection
pub mod analyze;

pub mod coordinator;
pub mod publish;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::coordinator::{Coordinator, RunReport};
pub use crate::state::RunState;
