//! Upload path: validate, persist the document, chunk, embed, persist the chunks.
//!
//! Each step is its own failure boundary. Once the document row exists, any
//! later failure removes it again (chunks cascade) before the original error is
//! returned, so a failed ingestion leaves nothing searchable behind.
//!
//! Dropping the future cancels the ingestion; no step after the await point
//! where the drop lands is executed, so embeddings that were already requested
//! are never persisted. A document created before the drop is removed by a
//! cleanup task spawned from [`DocumentGuard`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use ingest::{
    ChunkStrategy, Chunker, ChunkerConfig, DocumentId, NewChunk, RagError, Result,
};

use crate::embeddings::EmbeddingProvider;
use crate::store::VectorStore;

pub const DEFAULT_MIN_CONTENT_CHARS: usize = 10;

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub title: String,
    pub content: String,
    /// Overrides the pipeline's chunking parameters for this document.
    pub chunking: Option<ChunkerConfig>,
    pub strategy: ChunkStrategy,
}

impl IngestRequest {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            chunking: None,
            strategy: ChunkStrategy::default(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkerConfig) -> Self {
        self.chunking = Some(chunking);
        self
    }

    pub fn with_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub chunks_created: usize,
}

pub struct IngestionPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkerConfig,
    min_content_chars: usize,
}

impl IngestionPipeline {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            chunking: ChunkerConfig::default(),
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkerConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_min_content_chars(mut self, min_content_chars: usize) -> Self {
        self.min_content_chars = min_content_chars;
        self
    }

    fn validate(&self, request: &IngestRequest) -> Result<()> {
        if request.title.trim().is_empty() {
            return Err(RagError::Validation("title is required".to_string()));
        }
        let content_chars = request.content.trim().chars().count();
        if content_chars == 0 {
            return Err(RagError::Validation("content is required".to_string()));
        }
        if content_chars < self.min_content_chars {
            return Err(RagError::Validation(format!(
                "content is too short (minimum {} characters, got {content_chars})",
                self.min_content_chars
            )));
        }
        Ok(())
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        // 1. Validate
        self.validate(&request)?;
        let chunker = Chunker::new(request.chunking.unwrap_or(self.chunking));

        // 2. Persist the document
        let document = self
            .store
            .create_document(request.title.trim(), &request.content)
            .await
            .inspect_err(|e| error!(error = %e, "failed to create document"))?;
        let document_id = document.id;
        let guard = DocumentGuard::new(self.store.clone(), document_id);

        // 3-5. Chunk, embed, persist chunks; roll the document back on failure
        match self.index_chunks(document_id, &chunker, &request).await {
            Ok(chunks_created) => {
                guard.disarm();
                info!(
                    document.id = %document_id,
                    chunk_count = chunks_created,
                    strategy = ?request.strategy,
                    "ingested document"
                );
                Ok(IngestReport {
                    document_id,
                    chunks_created,
                })
            }
            Err(e) => {
                error!(document.id = %document_id, error = %e, kind = e.kind(), "ingestion failed");
                rollback(self.store.as_ref(), document_id).await;
                guard.disarm();
                Err(e)
            }
        }
    }

    async fn index_chunks(
        &self,
        document_id: DocumentId,
        chunker: &Chunker,
        request: &IngestRequest,
    ) -> Result<usize> {
        let contents = chunker.chunk(&request.content, request.strategy);
        if contents.is_empty() {
            return Err(RagError::Validation(
                "content produced no chunks".to_string(),
            ));
        }

        let embeddings = self.embedder.embed_batch(&contents).await?;
        if embeddings.len() != contents.len() {
            return Err(RagError::EmbeddingCountMismatch {
                expected: contents.len(),
                actual: embeddings.len(),
            });
        }

        let chunks = NewChunk::batch(document_id, contents, embeddings);
        self.store.insert_chunks(&chunks).await?;
        Ok(chunks.len())
    }
}

async fn rollback(store: &dyn VectorStore, document_id: DocumentId) {
    match store.delete_document(document_id).await {
        Ok(_) => warn!(document.id = %document_id, "rolled back partially ingested document"),
        Err(e) => warn!(
            document.id = %document_id,
            error = %e,
            "rollback failed, document left without chunks"
        ),
    }
}

/// Deletes a freshly created document when dropped while still armed, i.e. when
/// the ingestion future is cancelled between document creation and completion.
struct DocumentGuard {
    store: Arc<dyn VectorStore>,
    document_id: Option<DocumentId>,
}

impl DocumentGuard {
    fn new(store: Arc<dyn VectorStore>, document_id: DocumentId) -> Self {
        Self {
            store,
            document_id: Some(document_id),
        }
    }

    fn disarm(mut self) {
        self.document_id = None;
    }
}

impl Drop for DocumentGuard {
    fn drop(&mut self) {
        let Some(document_id) = self.document_id.take() else {
            return;
        };
        warn!(document.id = %document_id, "ingestion cancelled, scheduling cleanup");

        let store = self.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { rollback(store.as_ref(), document_id).await });
            }
            Err(_) => warn!(
                document.id = %document_id,
                "no runtime for cleanup, document left without chunks"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryVectorStore;
    use async_trait::async_trait;
    use ingest::{Document, DocumentSummary, DocumentWithChunks, RetrievalMatch};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Length-and-vowel embedder; records how many texts it was asked for.
    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
        short_by: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
            Ok(vec![text.len() as f32, vowels as f32 + 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = Vec::new();
            for text in &texts[..texts.len() - self.short_by.min(texts.len())] {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::embedding("test", "provider down"))
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::embedding("test", "provider down"))
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    /// Delegates to an in-memory store but can fail document creation or chunk inserts.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryVectorStore,
        fail_create: bool,
        fail_insert: bool,
        deleted: Mutex<Vec<DocumentId>>,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn create_document(&self, title: &str, content: &str) -> Result<Document> {
            if self.fail_create {
                return Err(RagError::store("flaky", "connection refused"));
            }
            self.inner.create_document(title, content).await
        }

        async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
            if self.fail_insert {
                return Err(RagError::store("flaky", "insert rejected"));
            }
            self.inner.insert_chunks(chunks).await
        }

        async fn similarity_search(
            &self,
            vector: &[f32],
            threshold: f32,
            limit: usize,
        ) -> Result<Vec<RetrievalMatch>> {
            self.inner.similarity_search(vector, threshold, limit).await
        }

        async fn delete_document(&self, id: DocumentId) -> Result<bool> {
            self.deleted.lock().unwrap().push(id);
            self.inner.delete_document(id).await
        }

        async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
            self.inner.list_documents().await
        }

        async fn get_document(&self, id: Uuid) -> Result<Option<DocumentWithChunks>> {
            self.inner.get_document(id).await
        }
    }

    const PROSE: &str = "Rust is a systems programming language focused on safety, speed and \
                         concurrency. It achieves memory safety without garbage collection.";

    #[tokio::test]
    async fn test_short_document_yields_one_chunk() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = IngestionPipeline::new(Arc::new(CountingEmbedder::default()), store.clone());

        let report = pipeline.ingest(IngestRequest::new("Test", PROSE)).await.unwrap();

        assert_eq!(report.chunks_created, 1);
        let stored = store.get_document(report.document_id).await.unwrap().unwrap();
        assert_eq!(stored.document.title, "Test");
        assert_eq!(stored.chunks.len(), 1);
        assert_eq!(stored.chunks[0].position, 0);
    }

    #[tokio::test]
    async fn test_long_document_positions_are_contiguous() {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(CountingEmbedder::default());
        let pipeline = IngestionPipeline::new(embedder.clone(), store.clone())
            .with_chunking(ChunkerConfig::new(60, 10).unwrap());

        let content = PROSE.repeat(5);
        let report = pipeline.ingest(IngestRequest::new("Long", content)).await.unwrap();

        assert!(report.chunks_created > 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        let stored = store.get_document(report.document_id).await.unwrap().unwrap();
        let positions: Vec<usize> = stored.chunks.iter().map(|c| c.position).collect();
        assert_eq!(positions, (0..report.chunks_created).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_request_chunking_overrides_default() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = IngestionPipeline::new(Arc::new(CountingEmbedder::default()), store);

        let request = IngestRequest::new("Doc", PROSE)
            .with_chunking(ChunkerConfig::new(40, 5).unwrap());
        let report = pipeline.ingest(request).await.unwrap();

        assert!(report.chunks_created > 1);
    }

    #[tokio::test]
    async fn test_validation_errors_touch_nothing() {
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = IngestionPipeline::new(embedder.clone(), store.clone());

        for (title, content) in [("", PROSE), ("  ", PROSE), ("T", ""), ("T", "too short"), ("T", "   short   ")] {
            let err = pipeline
                .ingest(IngestRequest::new(title, content))
                .await
                .unwrap_err();
            assert!(matches!(err, RagError::Validation(_)), "{title:?} {content:?}");
        }

        assert_eq!(store.document_count().await, 0);
        assert_eq!(store.chunk_count().await, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_on_create_creates_no_chunks() {
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(FlakyStore {
            fail_create: true,
            ..Default::default()
        });
        let pipeline = IngestionPipeline::new(embedder.clone(), store.clone());

        let err = pipeline.ingest(IngestRequest::new("T", PROSE)).await.unwrap_err();

        assert_eq!(err.kind(), "store_failure");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(store.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_rolls_back_document() {
        let store = Arc::new(FlakyStore::default());
        let pipeline = IngestionPipeline::new(Arc::new(FailingEmbedder), store.clone());

        let err = pipeline.ingest(IngestRequest::new("T", PROSE)).await.unwrap_err();

        assert_eq!(err.kind(), "embedding_failure");
        assert_eq!(store.deleted.lock().unwrap().len(), 1);
        assert_eq!(store.inner.document_count().await, 0);
    }

    #[tokio::test]
    async fn test_embedding_count_mismatch_is_fatal() {
        let store = Arc::new(FlakyStore::default());
        let embedder = Arc::new(CountingEmbedder {
            short_by: 1,
            ..Default::default()
        });
        let pipeline = IngestionPipeline::new(embedder, store.clone());

        let err = pipeline.ingest(IngestRequest::new("T", PROSE)).await.unwrap_err();

        assert!(matches!(
            err,
            RagError::EmbeddingCountMismatch { expected: 1, actual: 0 }
        ));
        assert_eq!(store.inner.chunk_count().await, 0);
        assert_eq!(store.inner.document_count().await, 0);
    }

    /// Never answers, so the ingestion can only end by being dropped.
    struct StalledEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StalledEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            std::future::pending().await
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            std::future::pending().await
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn test_cancelled_ingestion_removes_document() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = IngestionPipeline::new(Arc::new(StalledEmbedder), store.clone());

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            pipeline.ingest(IngestRequest::new("T", PROSE)),
        )
        .await;
        assert!(outcome.is_err());

        // the cleanup runs as a spawned task
        for _ in 0..100 {
            if store.document_count().await == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(store.document_count().await, 0);
        assert_eq!(store.chunk_count().await, 0);
    }

    #[tokio::test]
    async fn test_successful_ingestion_is_not_cleaned_up() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = IngestionPipeline::new(Arc::new(CountingEmbedder::default()), store.clone());

        pipeline.ingest(IngestRequest::new("T", PROSE)).await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(store.document_count().await, 1);
    }

    #[tokio::test]
    async fn test_insert_failure_rolls_back_document() {
        let store = Arc::new(FlakyStore {
            fail_insert: true,
            ..Default::default()
        });
        let pipeline = IngestionPipeline::new(Arc::new(CountingEmbedder::default()), store.clone());

        let err = pipeline.ingest(IngestRequest::new("T", PROSE)).await.unwrap_err();

        assert_eq!(err.kind(), "store_failure");
        assert_eq!(store.inner.document_count().await, 0);
    }
}
