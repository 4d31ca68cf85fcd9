//! Graph RAG: answer questions over a document corpus through a knowledge
//! graph of extracted entities and relationships.
//!
//! Documents are chunked, each chunk goes through extraction and
//! summarization, summaries are parsed into a graph, the graph is partitioned
//! into communities, and the final answer is synthesized from per-community
//! answers. Every expensive step is checkpointed in the store.

pub mod chunker;
pub mod graph;
pub mod jobs;
pub mod keys;
pub mod loader;
pub mod parser;
pub mod partition;
pub mod pipeline;

pub use chunker::{Chunk, Chunker};
pub use graph::{Community, CommunityDescription, GraphRecord, KnowledgeGraph};
pub use jobs::{JobKind, JobRecord, JobRegistry, JobStatus};
pub use loader::{load_documents, SourceDocument};
pub use parser::{parse_summary, ParsedSummary, Relationship};
pub use partition::{LouvainPartitioner, Partitioner};
pub use pipeline::{DocumentBatch, PipelineController, ProcessedDocument, NO_ANSWER};
