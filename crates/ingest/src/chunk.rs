use serde::{Deserialize, Serialize};

use crate::document::DocumentId;

/// A chunk ready to be persisted: text, its embedding and its place in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub document_id: DocumentId,
    pub content: String,
    pub embedding: Vec<f32>,
    /// 0-based; positions of one document form a contiguous 0..N-1 run.
    pub position: usize,
}

impl NewChunk {
    /// Pair chunk texts with their embeddings, numbering positions from zero.
    ///
    /// Callers must have checked that both sides have the same length.
    pub fn batch(
        document_id: DocumentId,
        contents: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Vec<NewChunk> {
        debug_assert_eq!(contents.len(), embeddings.len());
        contents
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(position, (content, embedding))| NewChunk {
                document_id,
                content,
                embedding,
                position,
            })
            .collect()
    }
}

/// A persisted chunk as returned with its document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredChunk {
    pub content: String,
    pub position: usize,
}

/// One retrieved chunk and its score. The score is an opaque ranking key
/// produced by the store: higher ranks first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalMatch {
    pub document_id: DocumentId,
    pub content: String,
    pub similarity: f32,
}
