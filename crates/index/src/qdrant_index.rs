use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use ingest::{
    Document, DocumentId, DocumentSummary, DocumentWithChunks, NewChunk, RagError, Result,
    RetrievalMatch, StoredChunk,
};

use crate::store::VectorStore;

const BACKEND: &str = "qdrant";
const SCROLL_PAGE: usize = 256;

/// Vector store backed by the Qdrant REST API.
///
/// Chunks live in `<collection>_chunks` (cosine distance, embedding
/// dimension). Documents live in `<collection>_documents` with a single-dimension
/// placeholder vector, since Qdrant points always carry one.
pub struct QdrantStore {
    base_url: String,
    client: reqwest::Client,
    chunk_collection: String,
    document_collection: String,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Serialize)]
struct UpsertPoints<P> {
    points: Vec<Point<P>>,
}

#[derive(Serialize)]
struct Point<P> {
    id: String,
    vector: Vec<f32>,
    payload: P,
}

#[derive(Serialize, Deserialize)]
struct ChunkPayload {
    document_id: DocumentId,
    content: String,
    position: usize,
}

#[derive(Serialize, Deserialize)]
struct DocumentPayload {
    title: String,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionList {
    collections: Vec<Collection>,
}

#[derive(Deserialize)]
struct Collection {
    name: String,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: ChunkPayload,
}

#[derive(Deserialize)]
struct RecordPoint<P> {
    id: DocumentId,
    payload: P,
}

#[derive(Deserialize)]
struct ScrollPage<P> {
    points: Vec<RecordPoint<P>>,
    next_page_offset: Option<serde_json::Value>,
}

impl QdrantStore {
    pub fn new(base_url: String, collection_name: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            chunk_collection: format!("{collection_name}_chunks"),
            document_collection: format!("{collection_name}_documents"),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> AnyResult<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Qdrant HTTP client")?;
        Ok(self)
    }

    /// Create missing collections and the `document_id` payload index.
    pub async fn init(&self, dimension: usize) -> Result<()> {
        self.init_collections(dimension)
            .await
            .map_err(|e| RagError::store(BACKEND, e))
    }

    async fn init_collections(&self, dimension: usize) -> AnyResult<()> {
        let url = format!("{}/collections", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to list collections: {}", response.status());
        }

        let info: Envelope<CollectionList> = response.json().await?;
        let exists = |name: &str| info.result.collections.iter().any(|c| c.name == name);

        if !exists(&self.chunk_collection) {
            self.create_collection(&self.chunk_collection, dimension, "Cosine")
                .await?;
            self.send(
                self.client
                    .put(self.url(&self.chunk_collection, "index"))
                    .json(&json!({ "field_name": "document_id", "field_schema": "keyword" })),
            )
            .await
            .context("Failed to create document_id payload index")?;
        }

        if !exists(&self.document_collection) {
            self.create_collection(&self.document_collection, 1, "Dot")
                .await?;
        }

        Ok(())
    }

    async fn create_collection(&self, name: &str, size: usize, distance: &str) -> AnyResult<()> {
        let url = format!("{}/collections/{}", self.base_url, name);
        let create_req = CreateCollection {
            vectors: VectorParams {
                size,
                distance: distance.to_string(),
            },
        };

        self.send(self.client.put(&url).json(&create_req))
            .await
            .with_context(|| format!("Failed to create collection '{name}'"))?;

        info!(collection = name, size, "created Qdrant collection");
        Ok(())
    }

    fn url(&self, collection: &str, path: &str) -> String {
        format!("{}/collections/{}/{}", self.base_url, collection, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> AnyResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .context("Failed to send request to Qdrant")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant returned {status}: {error_text}");
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> AnyResult<T> {
        let envelope: Envelope<T> = self
            .send(request)
            .await?
            .json()
            .await
            .context("Failed to parse Qdrant response")?;
        Ok(envelope.result)
    }

    async fn scroll_all<P: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Option<serde_json::Value>,
    ) -> AnyResult<Vec<RecordPoint<P>>> {
        let mut points = Vec::new();
        let mut offset: Option<serde_json::Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": false,
            });
            if let Some(filter) = &filter {
                body["filter"] = filter.clone();
            }
            if let Some(offset) = &offset {
                body["offset"] = offset.clone();
            }

            let page: ScrollPage<P> = self
                .send_json(self.client.post(self.url(collection, "points/scroll")).json(&body))
                .await?;
            points.extend(page.points);

            match page.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }

        Ok(points)
    }

    async fn fetch_document(&self, id: DocumentId) -> AnyResult<Option<Document>> {
        let url = self.url(&self.document_collection, &format!("points/{id}"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request to Qdrant")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch document point: {}", response.status());
        }

        let envelope: Envelope<RecordPoint<DocumentPayload>> = response
            .json()
            .await
            .context("Failed to parse Qdrant response")?;
        Ok(Some(into_document(envelope.result)))
    }

    fn document_filter(id: DocumentId) -> serde_json::Value {
        json!({ "must": [{ "key": "document_id", "match": { "value": id.to_string() } }] })
    }
}

fn into_document(point: RecordPoint<DocumentPayload>) -> Document {
    Document {
        id: point.id,
        title: point.payload.title,
        content: point.payload.content,
        created_at: point.payload.created_at,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn create_document(&self, title: &str, content: &str) -> Result<Document> {
        let document = Document::create(title, content);
        let upsert_req = UpsertPoints {
            points: vec![Point {
                id: document.id.to_string(),
                vector: vec![0.0],
                payload: DocumentPayload {
                    title: document.title.clone(),
                    content: document.content.clone(),
                    created_at: document.created_at,
                },
            }],
        };

        self.send(
            self.client
                .put(self.url(&self.document_collection, "points?wait=true"))
                .json(&upsert_req),
        )
        .await
        .map_err(|e| RagError::store(BACKEND, e))?;

        Ok(document)
    }

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let upsert_req = UpsertPoints {
            points: chunks
                .iter()
                .map(|chunk| Point {
                    id: uuid::Uuid::new_v4().to_string(),
                    vector: chunk.embedding.clone(),
                    payload: ChunkPayload {
                        document_id: chunk.document_id,
                        content: chunk.content.clone(),
                        position: chunk.position,
                    },
                })
                .collect(),
        };

        self.send(
            self.client
                .put(self.url(&self.chunk_collection, "points?wait=true"))
                .json(&upsert_req),
        )
        .await
        .map_err(|e| RagError::store(BACKEND, e))?;

        Ok(())
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievalMatch>> {
        let body = json!({
            "vector": vector,
            "limit": limit,
            "score_threshold": threshold,
            "with_payload": true,
        });

        let points: Vec<ScoredPoint> = self
            .send_json(
                self.client
                    .post(self.url(&self.chunk_collection, "points/search"))
                    .json(&body),
            )
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        Ok(points
            .into_iter()
            .map(|point| RetrievalMatch {
                document_id: point.payload.document_id,
                content: point.payload.content,
                similarity: point.score,
            })
            .collect())
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let existed = self
            .fetch_document(id)
            .await
            .map_err(|e| RagError::store(BACKEND, e))?
            .is_some();

        // chunks first: a crash in between leaves an empty document, never orphaned chunks
        self.send(
            self.client
                .post(self.url(&self.chunk_collection, "points/delete?wait=true"))
                .json(&json!({ "filter": Self::document_filter(id) })),
        )
        .await
        .map_err(|e| RagError::store(BACKEND, e))?;

        if existed {
            self.send(
                self.client
                    .post(self.url(&self.document_collection, "points/delete?wait=true"))
                    .json(&json!({ "points": [id.to_string()] })),
            )
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;
        }

        Ok(existed)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let points: Vec<RecordPoint<DocumentPayload>> = self
            .scroll_all(&self.document_collection, None)
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        let mut documents: Vec<DocumentSummary> = points
            .into_iter()
            .map(|p| into_document(p).summary())
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentWithChunks>> {
        let Some(document) = self
            .fetch_document(id)
            .await
            .map_err(|e| RagError::store(BACKEND, e))?
        else {
            return Ok(None);
        };

        let points: Vec<RecordPoint<ChunkPayload>> = self
            .scroll_all(&self.chunk_collection, Some(Self::document_filter(id)))
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        let chunks = points
            .into_iter()
            .map(|p| StoredChunk {
                content: p.payload.content,
                position: p.payload.position,
            })
            .collect();

        Ok(Some(DocumentWithChunks::new(document, chunks)))
    }
}
