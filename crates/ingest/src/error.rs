//! Error type shared by the chunker, the pipelines and their collaborators.

use thiserror::Error;

/// Everything that can go wrong while ingesting or answering.
///
/// Collaborator failures carry the rendered cause of the underlying client
/// error so the caller can tell which stage failed. An empty retrieval is not
/// an error and never shows up here.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad input shape or size. Raised before any collaborator is touched.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid chunking parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// The embedding provider returned a vector of the wrong length.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider returned a different number of vectors than inputs.
    #[error("embedding count mismatch: expected {expected} vectors, got {actual}")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    #[error("embedding provider failed ({provider}): {message}")]
    Embedding { provider: String, message: String },

    #[error("vector store failed ({backend}): {message}")]
    VectorStore { backend: String, message: String },

    #[error("completion provider failed ({provider}): {message}")]
    Completion { provider: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),
}

impl RagError {
    pub fn embedding(provider: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Embedding {
            provider: provider.into(),
            message: format!("{cause:#}"),
        }
    }

    pub fn store(backend: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::VectorStore {
            backend: backend.into(),
            message: format!("{cause:#}"),
        }
    }

    pub fn completion(provider: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Completion {
            provider: provider.into(),
            message: format!("{cause:#}"),
        }
    }

    /// Stable category name, used in logs and HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::DimensionMismatch { .. } | Self::EmbeddingCountMismatch { .. } => {
                "dimension_mismatch"
            }
            Self::Embedding { .. } => "embedding_failure",
            Self::VectorStore { .. } => "store_failure",
            Self::Completion { .. } => "completion_failure",
            Self::NotFound(_) => "not_found",
        }
    }

    /// True for failures of an external collaborator (embedding, store, completion).
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::Embedding { .. } | Self::VectorStore { .. } | Self::Completion { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
