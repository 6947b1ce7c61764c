use async_trait::async_trait;

use ingest::{
    Document, DocumentId, DocumentSummary, DocumentWithChunks, NewChunk, Result, RetrievalMatch,
};

/// Persistence and nearest-neighbour search over chunk embeddings.
///
/// Implementations own document identifiers, cascade chunk deletion when a
/// document goes away, and return search results already filtered by the
/// threshold and ranked best first.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_document(&self, title: &str, content: &str) -> Result<Document>;

    /// Insert a batch of chunks. All of them reference existing documents.
    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()>;

    async fn similarity_search(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievalMatch>>;

    /// Delete a document and its chunks. Returns `false` if it did not exist.
    async fn delete_document(&self, id: DocumentId) -> Result<bool>;

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentWithChunks>>;
}
