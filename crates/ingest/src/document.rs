use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::StoredChunk;

/// Identifier assigned by the vector store when a document is created.
pub type DocumentId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// A fresh document with a new v4 id, stamped now.
    pub fn create(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            title: self.title.clone(),
            created_at: self.created_at,
            content_chars: self.content.chars().count(),
        }
    }
}

/// Listing entry: everything but the content itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub content_chars: usize,
}

/// A document with its chunks in position order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentWithChunks {
    #[serde(flatten)]
    pub document: Document,
    pub chunks: Vec<StoredChunk>,
}

impl DocumentWithChunks {
    pub fn new(document: Document, mut chunks: Vec<StoredChunk>) -> Self {
        chunks.sort_by_key(|c| c.position);
        Self { document, chunks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_come_back_in_position_order() {
        let doc = Document::create("Title", "Body text here");
        let chunks = vec![
            StoredChunk { content: "two".into(), position: 2 },
            StoredChunk { content: "zero".into(), position: 0 },
            StoredChunk { content: "one".into(), position: 1 },
        ];
        let full = DocumentWithChunks::new(doc, chunks);

        let order: Vec<&str> = full.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(order, vec!["zero", "one", "two"]);
    }

    #[test]
    fn test_summary_counts_chars() {
        let doc = Document::create("Ünï", "héllo");
        assert_eq!(doc.summary().content_chars, 5);
        assert_eq!(doc.summary().id, doc.id);
    }
}
