//! Ingest then ask, with both pipelines sharing one in-memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use index::{EmbeddingProvider, InMemoryVectorStore, IngestRequest, IngestionPipeline, Indexer};
use ingest::Result;
use query::{ChatMessage, CompletionProvider, NO_RELEVANT_INFORMATION, QueryOptions, QueryPipeline};

const KEYWORDS: [&str; 4] = ["rust", "python", "memory", "garbage"];

struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect();
        v.push(0.1);
        Ok(v)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        KEYWORDS.len() + 1
    }
}

#[derive(Default)]
struct EchoLLM {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionProvider for EchoLLM {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let prompt = messages[0].content.clone();
        self.prompts.lock().unwrap().push(prompt);
        Ok("Python collects garbage.".to_string())
    }
}

#[tokio::test]
async fn ingest_query_delete_query() {
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(KeywordEmbedder);
    let llm = Arc::new(EchoLLM::default());

    let indexer = Indexer::new(
        IngestionPipeline::new(embedder.clone(), store.clone()),
        store.clone(),
    );
    let query = QueryPipeline::new(embedder, store.clone(), llm.clone());

    indexer
        .ingest(IngestRequest::new(
            "Rust",
            "Rust manages memory with ownership and borrowing. There is no garbage collector.",
        ))
        .await
        .unwrap();
    let python = indexer
        .ingest(IngestRequest::new(
            "Python",
            "Python relies on garbage collection and reference counting for memory.",
        ))
        .await
        .unwrap();

    let question = "What about Python garbage collection?";
    let result = query.query(question, QueryOptions::default()).await.unwrap();

    assert_eq!(result.answer, "Python collects garbage.");
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].document_id, python.document_id);

    {
        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[1] Python relies on garbage collection"));
        assert!(prompts[0].contains(question));
    }

    indexer.delete_document(python.document_id).await.unwrap();
    assert_eq!(store.document_count().await, 1);

    let after = query.query(question, QueryOptions::default()).await.unwrap();
    assert_eq!(after.answer, NO_RELEVANT_INFORMATION);
    assert!(after.sources.is_empty());
    assert_eq!(llm.prompts.lock().unwrap().len(), 1);
}
