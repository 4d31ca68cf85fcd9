//! Incremental Graph RAG pipeline.
//!
//! This library provides tools to:
//! - Chunk documents and extract entities/relationships through an LLM
//! - Build a knowledge graph from element summaries and detect communities
//! - Answer questions by combining per-community answers
//! - Checkpoint every stage in a pluggable store (in-memory or Neo4j)
//! - Gate inference calls through a shared token-bucket rate limiter
//! - Run indexing and queries as background jobs behind an HTTP API

pub mod cache;
pub mod config;
pub mod error;
pub mod graphrag;
pub mod integrations;
pub mod metrics;
pub mod prompts;
pub mod server;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export common types
pub use config::Config;
pub use error::{Error, Result};
pub use graphrag::{JobRegistry, PipelineController, NO_ANSWER};
pub use integrations::{HttpRateLimiter, OpenAIClient, RateLimitedGateway};
pub use prompts::{load_prompt, Prompt};
pub use store::{MemoryStore, Neo4jStore, Store};
