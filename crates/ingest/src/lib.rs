pub mod chunk;
pub mod chunker;
pub mod document;
pub mod error;

pub use chunk::{NewChunk, RetrievalMatch, StoredChunk};
pub use chunker::{ChunkStrategy, Chunker, ChunkerConfig, normalize_whitespace};
pub use document::{Document, DocumentId, DocumentSummary, DocumentWithChunks};
pub use error::{RagError, Result};
