//! Storage abstraction for cached pipeline artifacts.
//!
//! The [`Store`] trait is a key-value contract over named collections. Values
//! are opaque JSON payloads; typing happens one layer up in [`crate::cache`].
//! Implementations must be `Send + Sync` so a single handle can be shared by
//! every fan-out branch of the pipeline.

pub mod memory;
pub mod neo4j;

use async_trait::async_trait;

use crate::Result;

pub use memory::MemoryStore;
pub use neo4j::Neo4jStore;

/// Named entity collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Content hash -> document record.
    Document,
    /// Document id -> ordered chunks.
    Chunk,
    /// Document id -> ordered extraction texts.
    Element,
    /// Document id -> ordered summary texts.
    Summary,
    /// Summaries hash -> graph record.
    Graph,
    /// Summaries hash -> community descriptions.
    CommunityDescription,
    /// Summaries hash -> community summaries.
    CommunitySummary,
    /// Query hash -> final answer.
    QueryAnswer,
    /// Job id -> job record.
    Job,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Document => "Document",
            Collection::Chunk => "Chunk",
            Collection::Element => "Element",
            Collection::Summary => "Summary",
            Collection::Graph => "Graph",
            Collection::CommunityDescription => "CommunityDescription",
            Collection::CommunitySummary => "CommunitySummary",
            Collection::QueryAnswer => "QueryAnswer",
            Collection::Job => "Job",
        }
    }

    pub fn all() -> [Collection; 9] {
        [
            Collection::Document,
            Collection::Chunk,
            Collection::Element,
            Collection::Summary,
            Collection::Graph,
            Collection::CommunityDescription,
            Collection::CommunitySummary,
            Collection::QueryAnswer,
            Collection::Job,
        ]
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value store over [`Collection`]s.
///
/// # Contract
///
/// - `get` on a missing key returns `Ok(None)`, never a default value.
/// - `put` is an upsert; re-saving a key replaces its payload.
/// - `clear_all` empties every collection and leaves the store usable.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<String>>;

    async fn put(&self, collection: Collection, key: &str, payload: String) -> Result<()>;

    async fn clear_all(&self) -> Result<()>;

    /// Connectivity check used by the health endpoint.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}
