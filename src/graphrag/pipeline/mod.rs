//! Pipeline controller.
//!
//! Ties the document stage (dedup, chunk, extract, summarize per document)
//! to the corpus stage (graph, communities, hierarchical answer synthesis).
//! Every stage boundary is a cache checkpoint keyed by upstream content.
//! Collaborators are injected through [`PipelineController::new`].

mod corpus;
mod document;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::chunker::{Chunk, Chunker};
use super::loader::{load_documents, SourceDocument};
use super::partition::Partitioner;
use crate::cache::Cache;
use crate::config::{Config, GraphConfig, PipelineConfig};
use crate::integrations::RateLimitedGateway;
use crate::prompts::PromptSet;
use crate::store::Store;
use crate::{Error, Result};

/// Returned instead of an answer when the graph yields no communities.
pub const NO_ANSWER: &str =
    "The answer cannot be determined from the provided documents at this time, please try again later.";

/// Stored under the document's content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub file_path: String,
    pub content_hash: String,
}

/// Extraction output for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub chunk_index: usize,
    pub content: String,
}

/// Summary of one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub element_index: usize,
    pub summary: String,
}

/// Result of the document stage for one document.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub document_id: String,
    pub file_path: String,
    pub chunks: Vec<Chunk>,
    pub summaries: Vec<String>,
    /// Served entirely from cache.
    pub cached: bool,
}

/// Outcome of the document fan-out. Failures are collected, not fail-fast.
#[derive(Debug, Default)]
pub struct DocumentBatch {
    pub documents: Vec<ProcessedDocument>,
    pub failures: Vec<Error>,
}

impl DocumentBatch {
    pub fn summaries(&self) -> Vec<String> {
        self.documents
            .iter()
            .flat_map(|d| d.summaries.iter().cloned())
            .collect()
    }

    /// The batch as a whole fails with the first document error.
    pub fn into_result(mut self) -> Result<Vec<ProcessedDocument>> {
        if self.failures.is_empty() {
            Ok(self.documents)
        } else {
            Err(self.failures.swap_remove(0))
        }
    }
}

pub struct PipelineController {
    cache: Cache,
    gateway: Arc<RateLimitedGateway>,
    partitioner: Arc<dyn Partitioner>,
    chunker: Chunker,
    graph: GraphConfig,
    prompts: PromptSet,
}

impl PipelineController {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<RateLimitedGateway>,
        partitioner: Arc<dyn Partitioner>,
        pipeline: &PipelineConfig,
        graph: GraphConfig,
        prompts: PromptSet,
    ) -> Self {
        Self {
            cache: Cache::new(store),
            gateway,
            partitioner,
            chunker: Chunker::new(pipeline.chunk_size, pipeline.chunk_overlap),
            graph,
            prompts,
        }
    }

    /// Controller wired from a loaded configuration.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn Store>,
        gateway: Arc<RateLimitedGateway>,
        partitioner: Arc<dyn Partitioner>,
    ) -> Self {
        Self::new(
            store,
            gateway,
            partitioner,
            &config.pipeline,
            config.graph.clone(),
            PromptSet::resolve(),
        )
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.cache.store()
    }

    /// Index a folder: document stage only. Returns the number of documents.
    pub async fn index_folder(&self, folder: impl AsRef<Path>) -> Result<usize> {
        let folder = folder.as_ref();
        info!(folder = %folder.display(), "Indexing documents");
        self.gateway.init_bucket().await;

        let documents = load_documents(folder)?;
        if documents.is_empty() {
            return Err(Error::InvalidArgument("No documents found".to_string()));
        }

        let processed = self.process_documents(&documents).await.into_result()?;
        info!(documents = processed.len(), "Indexing completed");
        Ok(processed.len())
    }

    /// Answer a query over the documents in a folder.
    pub async fn query_folder(&self, query: &str, folder: impl AsRef<Path>) -> Result<String> {
        let folder = folder.as_ref();
        info!(query, folder = %folder.display(), "Starting Graph RAG pipeline");
        self.gateway.init_bucket().await;

        let documents = load_documents(folder)?;
        self.query_documents(query, &documents).await
    }

    /// Full pipeline over an in-memory corpus.
    pub async fn query_documents(&self, query: &str, documents: &[SourceDocument]) -> Result<String> {
        let batch = self.process_documents(documents).await;
        let summaries = batch.summaries();
        if let Err(err) = batch.into_result() {
            error!(error = %err, "Document stage failed");
            return Err(err);
        }

        info!(
            summaries = summaries.len(),
            documents = documents.len(),
            "Collected summaries"
        );
        let answer = self.answer(query, &summaries).await?;
        info!("Pipeline completed");
        Ok(answer)
    }
}
