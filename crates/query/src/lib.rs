pub mod llm;
pub mod pipeline;
pub mod prompt;

pub use llm::{ChatMessage, CompletionBackend, CompletionProvider, QueryLLM, Role};
pub use pipeline::{QueryOptions, QueryPipeline, QueryResult};
pub use prompt::{NO_RELEVANT_INFORMATION, build_context, build_prompt};
