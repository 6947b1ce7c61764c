//! Question path: embed the question, retrieve, assemble context, complete.
//!
//! Zero matches short-circuits to [`NO_RELEVANT_INFORMATION`] without calling
//! the completion provider. Every collaborator failure aborts the query with
//! its own error kind; nothing is ever answered from an empty retrieval.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use index::{EmbeddingProvider, VectorStore};
use ingest::{RagError, Result, RetrievalMatch};

use crate::llm::{ChatMessage, CompletionProvider};
use crate::prompt::{NO_RELEVANT_INFORMATION, build_context, build_prompt};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    pub top_k: usize,
    pub similarity_threshold: f32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.5,
        }
    }
}

impl QueryOptions {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::Validation(
                "topK must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::Validation(format!(
                "similarityThreshold must be between 0 and 1, got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    /// Matches that fed the answer, in rank order.
    pub sources: Vec<RetrievalMatch>,
}

pub struct QueryPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn CompletionProvider>,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
        }
    }

    pub async fn query(&self, question: &str, options: QueryOptions) -> Result<QueryResult> {
        // Step 1: Validate
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Validation("question is required".to_string()));
        }
        options.validate()?;

        // Step 2: Embed the question
        let query_embedding = self
            .embedder
            .embed(question)
            .await
            .inspect_err(|e| error!(error = %e, "failed to embed question"))?;

        // Step 3: Ranked, thresholded retrieval
        let sources = self
            .store
            .similarity_search(&query_embedding, options.similarity_threshold, options.top_k)
            .await
            .inspect_err(|e| error!(error = %e, "similarity search failed"))?;

        // Step 4: Nothing relevant, nothing to ask the model
        if sources.is_empty() {
            info!(
                top_k = options.top_k,
                threshold = options.similarity_threshold,
                "no matches above threshold"
            );
            return Ok(QueryResult {
                answer: NO_RELEVANT_INFORMATION.to_string(),
                sources,
            });
        }

        // Step 5-6: Context and prompt
        let context = build_context(&sources);
        let prompt = build_prompt(&context, question);

        // Step 7: One user message, answer returned verbatim
        let answer = self
            .llm
            .complete(&[ChatMessage::user(prompt)])
            .await
            .inspect_err(|e| error!(error = %e, "completion failed"))?;

        info!(
            matches = sources.len(),
            context_size = context.len(),
            "answered question"
        );

        Ok(QueryResult { answer, sources })
    }
}
