use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use index::{EmbeddingProvider, IngestRequest, IngestionPipeline, Indexer, VectorStore};
use ingest::{
    ChunkStrategy, ChunkerConfig, DocumentId, DocumentSummary, DocumentWithChunks, RagError,
    RetrievalMatch,
};
use query::{CompletionProvider, QueryOptions, QueryPipeline};

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::metrics::{Metrics, MetricsSnapshot, TimedOperation};

#[derive(Clone)]
pub struct AppState {
    indexer: Arc<Indexer>,
    query: Arc<QueryPipeline>,
    metrics: Arc<Metrics>,
    chunking: ChunkerConfig,
    query_defaults: QueryOptions,
}

impl AppState {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn CompletionProvider>,
        config: &AppConfig,
    ) -> ingest::Result<Self> {
        let chunking = config.chunker_config()?;
        let pipeline = IngestionPipeline::new(embedder.clone(), store.clone())
            .with_chunking(chunking)
            .with_min_content_chars(config.min_content_chars);

        Ok(Self {
            indexer: Arc::new(Indexer::new(pipeline, store.clone())),
            query: Arc::new(QueryPipeline::new(embedder, store, llm)),
            metrics: Metrics::new(),
            chunking,
            query_defaults: config.query,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/api/health", get(health))
        .route("/api/documents/upload", post(upload_document))
        .route("/api/query", post(query_documents))
        .route("/api/documents", get(list_documents))
        .route(
            "/api/documents/:id",
            get(get_document).delete(delete_document),
        )
        .route("/api/metrics", get(metrics))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    success: bool,
    message: &'static str,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    max_chunk_size: Option<i64>,
    overlap: Option<i64>,
    #[serde(default)]
    strategy: ChunkStrategy,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    document_id: DocumentId,
    chunks_created: usize,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    #[serde(default)]
    question: String,
    top_k: Option<usize>,
    similarity_threshold: Option<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    success: bool,
    answer: String,
    sources: Vec<RetrievalMatch>,
    retrieved_chunks: usize,
}

#[derive(Serialize)]
struct DocumentsResponse {
    success: bool,
    count: usize,
    documents: Vec<DocumentSummary>,
}

#[derive(Serialize)]
struct DocumentResponse {
    success: bool,
    document: DocumentWithChunks,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: &'static str,
}

/// Count the request as succeeded or failed, then pass the result through.
fn tally<T>(metrics: &Metrics, result: Result<T, ApiError>) -> Result<T, ApiError> {
    metrics.record_request(result.is_ok());
    result
}

fn parse_document_id(raw: &str) -> Result<DocumentId, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| RagError::Validation(format!("invalid document id: {raw}")).into())
}

async fn banner() -> &'static str {
    "RAG document QA service"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "RAG service is running",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn upload_document(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let timer = TimedOperation::start();
    let report = tally(&state.metrics, ingest_upload(&state, payload).await)?;
    state.metrics.record_ingest(timer.elapsed(), report.chunks_created);

    Ok(Json(UploadResponse {
        success: true,
        document_id: report.document_id,
        chunks_created: report.chunks_created,
        message: "Document uploaded and processed successfully",
    }))
}

async fn ingest_upload(
    state: &AppState,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<index::IngestReport, ApiError> {
    let Json(req) = payload?;

    let mut request = IngestRequest::new(req.title, req.content).with_strategy(req.strategy);
    if req.max_chunk_size.is_some() || req.overlap.is_some() {
        let chunking = ChunkerConfig::from_signed(
            req.max_chunk_size
                .unwrap_or(state.chunking.max_chunk_size() as i64),
            req.overlap.unwrap_or(state.chunking.overlap() as i64),
        )?;
        request = request.with_chunking(chunking);
    }

    Ok(state.indexer.ingest(request).await?)
}

async fn query_documents(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let timer = TimedOperation::start();
    let result = tally(&state.metrics, answer_query(&state, payload).await)?;
    state.metrics.record_query(timer.elapsed(), result.sources.len());

    Ok(Json(QueryResponse {
        success: true,
        retrieved_chunks: result.sources.len(),
        answer: result.answer,
        sources: result.sources,
    }))
}

async fn answer_query(
    state: &AppState,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<query::QueryResult, ApiError> {
    let Json(req) = payload?;
    let options = QueryOptions {
        top_k: req.top_k.unwrap_or(state.query_defaults.top_k),
        similarity_threshold: req
            .similarity_threshold
            .unwrap_or(state.query_defaults.similarity_threshold),
    };

    Ok(state.query.query(&req.question, options).await?)
}

async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let documents = tally(
        &state.metrics,
        state.indexer.list_documents().await.map_err(ApiError::from),
    )?;

    Ok(Json(DocumentsResponse {
        success: true,
        count: documents.len(),
        documents,
    }))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let result = match parse_document_id(&id) {
        Ok(id) => state.indexer.get_document(id).await.map_err(ApiError::from),
        Err(e) => Err(e),
    };
    let document = tally(&state.metrics, result)?;

    Ok(Json(DocumentResponse {
        success: true,
        document,
    }))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let result = match parse_document_id(&id) {
        Ok(id) => state.indexer.delete_document(id).await.map_err(ApiError::from),
        Err(e) => Err(e),
    };
    tally(&state.metrics, result)?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Document deleted successfully",
    }))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
