use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};

use super::{
    DocumentBatch, DocumentRecord, ElementRecord, PipelineController, ProcessedDocument,
    SummaryRecord,
};
use crate::graphrag::chunker::Chunk;
use crate::graphrag::keys;
use crate::graphrag::loader::SourceDocument;
use crate::prompts::Prompt;
use crate::store::Collection;
use crate::{Error, Result};

impl PipelineController {
    /// Run the document stage for every document concurrently.
    ///
    /// One failing document never stops the others; failures are returned
    /// alongside the successes, each tagged with its path.
    pub async fn process_documents(&self, documents: &[SourceDocument]) -> DocumentBatch {
        info!(count = documents.len(), "Processing documents");
        let results = join_all(documents.iter().map(|doc| self.process_document(doc))).await;

        let mut batch = DocumentBatch::default();
        for (doc, result) in documents.iter().zip(results) {
            match result {
                Ok(processed) => batch.documents.push(processed),
                Err(err) => {
                    warn!(path = %doc.path, error = %err, "Document failed");
                    // Admission exhaustion stays retryable for the caller.
                    if err.is_retryable() {
                        batch.failures.push(err);
                    } else {
                        batch.failures.push(Error::document(&doc.path, &err));
                    }
                }
            }
        }
        batch
    }

    /// Dedup by content hash, otherwise chunk, extract and summarize.
    pub async fn process_document(&self, doc: &SourceDocument) -> Result<ProcessedDocument> {
        let content_hash = keys::content_hash(&doc.content);

        let record = match self
            .cache
            .get::<DocumentRecord>(Collection::Document, &content_hash)
            .await?
        {
            Some(record) => {
                if let Some(processed) = self.load_cached(&record, doc).await? {
                    crate::metrics::record_cache_lookup(Collection::Document.as_str(), true);
                    info!(document_id = %record.document_id, "Document found in cache");
                    return Ok(processed);
                }
                warn!(document_id = %record.document_id, "Cached document is incomplete, reprocessing");
                record
            }
            None => {
                let record = DocumentRecord {
                    document_id: keys::document_id(&doc.path, &doc.content),
                    file_path: doc.path.clone(),
                    content_hash: content_hash.clone(),
                };
                self.cache
                    .put(Collection::Document, &content_hash, &record)
                    .await?;
                record
            }
        };
        crate::metrics::record_cache_lookup(Collection::Document.as_str(), false);

        info!(document_id = %record.document_id, "Processing new document");
        let id = record.document_id.as_str();

        let chunks = self.chunker.chunk(&doc.content);
        self.cache.put(Collection::Chunk, id, &chunks).await?;
        debug!(document_id = id, chunks = chunks.len(), "Document chunked");

        let elements = self.extract_elements(&chunks).await?;
        let element_records: Vec<ElementRecord> = elements
            .iter()
            .enumerate()
            .map(|(chunk_index, content)| ElementRecord {
                chunk_index,
                content: content.clone(),
            })
            .collect();
        self.cache
            .put(Collection::Element, id, &element_records)
            .await?;

        let summaries = self.summarize_elements(&elements).await?;
        let summary_records: Vec<SummaryRecord> = summaries
            .iter()
            .enumerate()
            .map(|(element_index, summary)| SummaryRecord {
                element_index,
                summary: summary.clone(),
            })
            .collect();
        self.cache
            .put(Collection::Summary, id, &summary_records)
            .await?;

        info!(document_id = id, summaries = summaries.len(), "Document processed");
        Ok(ProcessedDocument {
            document_id: record.document_id.clone(),
            file_path: doc.path.clone(),
            chunks,
            summaries,
            cached: false,
        })
    }

    /// Chunks and summaries of an already processed document, if both exist.
    /// The result carries the path being processed now.
    async fn load_cached(
        &self,
        record: &DocumentRecord,
        doc: &SourceDocument,
    ) -> Result<Option<ProcessedDocument>> {
        let id = record.document_id.as_str();
        let Some(chunks) = self.cache.get::<Vec<Chunk>>(Collection::Chunk, id).await? else {
            return Ok(None);
        };
        let Some(mut summaries) = self
            .cache
            .get::<Vec<SummaryRecord>>(Collection::Summary, id)
            .await?
        else {
            return Ok(None);
        };
        summaries.sort_by_key(|s| s.element_index);

        Ok(Some(ProcessedDocument {
            document_id: record.document_id.clone(),
            file_path: doc.path.clone(),
            chunks,
            summaries: summaries.into_iter().map(|s| s.summary).collect(),
            cached: true,
        }))
    }

    /// One extraction call per chunk; output order follows chunk order.
    async fn extract_elements(&self, chunks: &[Chunk]) -> Result<Vec<String>> {
        info!(chunks = chunks.len(), "Extracting elements");
        let system = self.prompts.get(Prompt::Extraction);
        try_join_all(chunks.iter().map(|chunk| async move {
            debug!(chunk = chunk.index, "Extracting chunk");
            self.gateway
                .ask(Prompt::Extraction.kind(), system, chunk.content.clone())
                .await
        }))
        .await
    }

    /// One summarization call per element; output order follows input order.
    async fn summarize_elements(&self, elements: &[String]) -> Result<Vec<String>> {
        info!(elements = elements.len(), "Summarizing elements");
        let system = self.prompts.get(Prompt::SummarizeElements);
        try_join_all(elements.iter().enumerate().map(|(i, element)| async move {
            debug!(element = i, "Summarizing element");
            self.gateway
                .ask(Prompt::SummarizeElements.kind(), system, element.clone())
                .await
        }))
        .await
    }
}
