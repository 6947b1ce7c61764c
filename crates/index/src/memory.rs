//! In-process vector store used for development and tests.
//!
//! Exact cosine search over every stored chunk behind a `tokio::sync::RwLock`.

use std::collections::HashMap;
use std::cmp::Ordering;

use async_trait::async_trait;
use tokio::sync::RwLock;

use ingest::{
    Document, DocumentId, DocumentSummary, DocumentWithChunks, NewChunk, RagError, Result,
    RetrievalMatch, StoredChunk,
};

use crate::store::VectorStore;

const BACKEND: &str = "memory";

#[derive(Default)]
struct Inner {
    documents: HashMap<DocumentId, Document>,
    chunks: Vec<NewChunk>,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn chunk_count(&self) -> usize {
        self.inner.read().await.chunks.len()
    }

    pub async fn document_count(&self) -> usize {
        self.inner.read().await.documents.len()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_document(&self, title: &str, content: &str) -> Result<Document> {
        let document = Document::create(title, content);
        self.inner
            .write()
            .await
            .documents
            .insert(document.id, document.clone());
        Ok(document)
    }

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
        let mut inner = self.inner.write().await;

        if let Some(orphan) = chunks
            .iter()
            .find(|c| !inner.documents.contains_key(&c.document_id))
        {
            return Err(RagError::store(
                BACKEND,
                format!("document {} does not exist", orphan.document_id),
            ));
        }

        inner.chunks.extend_from_slice(chunks);
        Ok(())
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievalMatch>> {
        let inner = self.inner.read().await;

        if let Some(chunk) = inner.chunks.iter().find(|c| c.embedding.len() != vector.len()) {
            return Err(RagError::store(
                BACKEND,
                format!(
                    "query vector has {} dimensions, stored vectors have {}",
                    vector.len(),
                    chunk.embedding.len()
                ),
            ));
        }

        let mut matches: Vec<RetrievalMatch> = inner
            .chunks
            .iter()
            .map(|chunk| RetrievalMatch {
                document_id: chunk.document_id,
                content: chunk.content.clone(),
                similarity: cosine_similarity(&chunk.embedding, vector),
            })
            .filter(|m| m.similarity >= threshold)
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let existed = inner.documents.remove(&id).is_some();
        inner.chunks.retain(|c| c.document_id != id);
        Ok(existed)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let inner = self.inner.read().await;
        let mut documents: Vec<DocumentSummary> =
            inner.documents.values().map(Document::summary).collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentWithChunks>> {
        let inner = self.inner.read().await;
        let Some(document) = inner.documents.get(&id) else {
            return Ok(None);
        };

        let chunks = inner
            .chunks
            .iter()
            .filter(|c| c.document_id == id)
            .map(|c| StoredChunk {
                content: c.content.clone(),
                position: c.position,
            })
            .collect();

        Ok(Some(DocumentWithChunks::new(document.clone(), chunks)))
    }
}
