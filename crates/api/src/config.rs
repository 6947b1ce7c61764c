use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use index::{DEFAULT_MIN_CONTENT_CHARS, EmbeddingBackend};
use ingest::{ChunkerConfig, Result};
use query::{CompletionBackend, QueryOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    pub cors_origins: Vec<String>,
    pub log_json: bool,
    /// Applied to every collaborator HTTP client, not to the pipelines.
    pub request_timeout_secs: u64,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub store: StoreConfig,
    /// Unvalidated until [`AppConfig::chunker_config`].
    pub chunking: ChunkingSettings,
    pub min_content_chars: usize,
    pub query: QueryOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub provider: CompletionBackend,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkingSettings {
    pub max_chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        let defaults = ChunkerConfig::default();
        Self {
            max_chunk_size: defaults.max_chunk_size(),
            overlap: defaults.overlap(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory, // process-local, lost on restart
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub qdrant_url: String,
    pub collection: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            cors_origins: vec!["http://localhost:5173".to_string()],
            log_json: false,
            request_timeout_secs: 60,
            embedding: EmbeddingConfig {
                provider: EmbeddingBackend::Ollama,
                base_url: "http://localhost:11434".to_string(),
                model: "all-minilm".to_string(),
                api_key: None,
                dimension: 384,
            },
            completion: CompletionConfig {
                provider: CompletionBackend::OpenAi,
                base_url: "https://openrouter.ai/api/v1".to_string(),
                model: "meta-llama/llama-3.3-70b-instruct:free".to_string(),
                api_key: None,
                temperature: 0.7,
                max_tokens: 500,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                qdrant_url: "http://localhost:6333".to_string(),
                collection: "documents".to_string(),
            },
            chunking: ChunkingSettings::default(),
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
            query: QueryOptions::default(),
        }
    }
}

impl AppConfig {
    /// Process environment first, `.env` entries for anything it leaves unset.
    pub fn from_env_and_dotenv(dotenv: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| dotenv.get(key).cloned())
        })
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            config.bind_addr = format!("0.0.0.0:{}", port.trim());
        }
        if let Some(addr) = lookup("RAG_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(origins) = lookup("CORS_ORIGIN") {
            config.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        parse_into(&lookup, "RAG_LOG_JSON", &mut config.log_json);
        parse_into(&lookup, "RAG_REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs);

        // Embeddings
        if let Some(provider) = lookup("EMBEDDING_PROVIDER") {
            match provider.trim().to_lowercase().as_str() {
                "ollama" => config.embedding.provider = EmbeddingBackend::Ollama,
                "openai" => config.embedding.provider = EmbeddingBackend::OpenAi,
                other => warn!(value = other, "unknown EMBEDDING_PROVIDER, keeping default"),
            }
        }
        if let Some(url) = lookup("EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(key) = lookup("EMBEDDING_API_KEY") {
            config.embedding.api_key = Some(key);
        }
        parse_into(&lookup, "EMBEDDING_DIM", &mut config.embedding.dimension);

        // Completions
        if let Some(provider) = lookup("COMPLETION_PROVIDER") {
            match provider.trim().to_lowercase().as_str() {
                "openai" | "openrouter" => config.completion.provider = CompletionBackend::OpenAi,
                "ollama" => config.completion.provider = CompletionBackend::Ollama,
                other => warn!(value = other, "unknown COMPLETION_PROVIDER, keeping default"),
            }
        }
        if let Some(url) = lookup("COMPLETION_BASE_URL") {
            config.completion.base_url = url;
        }
        if let Some(model) = lookup("COMPLETION_MODEL") {
            config.completion.model = model;
        }
        if let Some(key) = lookup("COMPLETION_API_KEY").or_else(|| lookup("OPENROUTER_API_KEY")) {
            config.completion.api_key = Some(key);
        }
        parse_into(&lookup, "COMPLETION_TEMPERATURE", &mut config.completion.temperature);
        parse_into(&lookup, "COMPLETION_MAX_TOKENS", &mut config.completion.max_tokens);

        // Vector store
        if let Some(backend) = lookup("VECTOR_STORE") {
            match backend.trim().to_lowercase().as_str() {
                "memory" => config.store.backend = StoreBackend::Memory,
                "qdrant" => config.store.backend = StoreBackend::Qdrant,
                other => warn!(value = other, "unknown VECTOR_STORE, keeping default"),
            }
        }
        if let Some(url) = lookup("QDRANT_URL") {
            config.store.qdrant_url = url;
        }
        if let Some(collection) = lookup("QDRANT_COLLECTION") {
            config.store.collection = collection;
        }

        // Pipelines
        parse_into(&lookup, "CHUNK_SIZE", &mut config.chunking.max_chunk_size);
        parse_into(&lookup, "CHUNK_OVERLAP", &mut config.chunking.overlap);
        parse_into(&lookup, "MIN_CONTENT_CHARS", &mut config.min_content_chars);
        parse_into(&lookup, "QUERY_TOP_K", &mut config.query.top_k);
        parse_into(
            &lookup,
            "QUERY_SIMILARITY_THRESHOLD",
            &mut config.query.similarity_threshold,
        );

        config
    }

    /// Reject settings the pipelines would refuse at request time anyway.
    pub fn validate(&self) -> Result<()> {
        self.chunker_config()?;
        self.query.validate()?;
        Ok(())
    }

    pub fn chunker_config(&self) -> Result<ChunkerConfig> {
        ChunkerConfig::new(self.chunking.max_chunk_size, self.chunking.overlap)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Entries of the `.env` file at `path`; a missing file yields none.
pub fn read_dotenv(path: impl AsRef<Path>) -> anyhow::Result<HashMap<String, String>> {
    let path = path.as_ref();
    match dotenvy::from_path_iter(path) {
        Ok(entries) => entries
            .collect::<std::result::Result<HashMap<_, _>, _>>()
            .with_context(|| format!("Failed to parse {}", path.display())),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn parse_into<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: FromStr,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(e) => warn!(key, value = %raw, error = %e, "ignoring unparseable setting"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_dotenv_file_fills_settings() {
        let path = std::env::temp_dir().join(format!("rag-{}.env", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "# local overrides\nRAG_TEST_COMPLETION_KEY=sk-from-file\nQUERY_TOP_K=7\n",
        )
        .unwrap();

        let dotenv = read_dotenv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(dotenv.get("RAG_TEST_COMPLETION_KEY").map(String::as_str), Some("sk-from-file"));
        let config = AppConfig::from_lookup(|key| dotenv.get(key).cloned());
        assert_eq!(config.query.top_k, 7);
    }

    #[test]
    fn test_missing_dotenv_file_is_empty() {
        let path = std::env::temp_dir().join(format!("absent-{}.env", uuid::Uuid::new_v4()));
        assert!(read_dotenv(&path).unwrap().is_empty());
    }

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.embedding.provider, EmbeddingBackend::Ollama);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.completion.provider, CompletionBackend::OpenAi);
        assert_eq!(config.completion.max_tokens, 500);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.chunker_config().unwrap(), ChunkerConfig::default());
        assert_eq!(config.query, QueryOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("CORS_ORIGIN", "http://a.test, http://b.test"),
            ("EMBEDDING_PROVIDER", "OpenAI"),
            ("EMBEDDING_DIM", "1536"),
            ("OPENROUTER_API_KEY", "sk-or"),
            ("VECTOR_STORE", "qdrant"),
            ("CHUNK_SIZE", "200"),
            ("CHUNK_OVERLAP", "20"),
            ("QUERY_TOP_K", "3"),
            ("QUERY_SIMILARITY_THRESHOLD", "0.25"),
        ]);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.embedding.provider, EmbeddingBackend::OpenAi);
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.completion.api_key.as_deref(), Some("sk-or"));
        assert_eq!(config.store.backend, StoreBackend::Qdrant);
        assert_eq!(config.chunking.max_chunk_size, 200);
        assert_eq!(config.chunking.overlap, 20);
        assert_eq!(config.query.top_k, 3);
        assert_eq!(config.query.similarity_threshold, 0.25);
    }

    #[test]
    fn test_explicit_bind_addr_wins_over_port() {
        let config = config_from(&[("PORT", "8080"), ("RAG_BIND_ADDR", "127.0.0.1:9000")]);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn test_unparseable_values_keep_defaults() {
        let config = config_from(&[
            ("EMBEDDING_DIM", "wide"),
            ("QUERY_TOP_K", "-1"),
            ("VECTOR_STORE", "postgres"),
        ]);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.query.top_k, 5);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_invalid_chunking_fails_validation() {
        let config = config_from(&[("CHUNK_SIZE", "50"), ("CHUNK_OVERLAP", "50")]);
        assert_eq!(config.validate().unwrap_err().kind(), "config");
        assert_eq!(config.chunker_config().unwrap_err().kind(), "config");
    }

    #[test]
    fn test_api_keys_are_not_serialized() {
        let config = config_from(&[("EMBEDDING_API_KEY", "secret"), ("COMPLETION_API_KEY", "secret")]);
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
