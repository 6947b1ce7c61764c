pub mod embeddings;
pub mod memory;
pub mod pipeline;
pub mod qdrant_index;
pub mod store;

pub use embeddings::{EmbeddingBackend, EmbeddingClient, EmbeddingProvider};
pub use memory::InMemoryVectorStore;
pub use pipeline::{DEFAULT_MIN_CONTENT_CHARS, IngestReport, IngestRequest, IngestionPipeline};
pub use qdrant_index::QdrantStore;
pub use store::VectorStore;

use std::sync::Arc;

use ingest::{DocumentId, DocumentSummary, DocumentWithChunks, RagError, Result};
use tracing::info;

/// Document-facing facade: ingestion plus the catalog operations
/// (list, fetch, delete) over the same store.
pub struct Indexer {
    pipeline: IngestionPipeline,
    store: Arc<dyn VectorStore>,
}

impl Indexer {
    pub fn new(pipeline: IngestionPipeline, store: Arc<dyn VectorStore>) -> Self {
        Self { pipeline, store }
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        self.pipeline.ingest(request).await
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        self.store.list_documents().await
    }

    pub async fn get_document(&self, id: DocumentId) -> Result<DocumentWithChunks> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("document {id}")))
    }

    pub async fn delete_document(&self, id: DocumentId) -> Result<()> {
        if !self.store.delete_document(id).await? {
            return Err(RagError::NotFound(format!("document {id}")));
        }
        info!(document.id = %id, "deleted document");
        Ok(())
    }
}
