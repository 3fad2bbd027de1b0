use crate::embedding_service::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<usize>;

    /// Up to `k` chunks ordered by descending similarity.
    async fn similarity_search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Removes every chunk of a document and returns how many were removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    async fn count(&self) -> Result<usize>;

    /// All chunks of a document ordered by chunk index.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Drops every chunk and returns how many were removed.
    async fn clear(&self) -> Result<usize>;

    fn name(&self) -> &str;
}

/// Brute-force cosine index held in memory, optionally mirrored to a JSON
/// snapshot so it survives restarts.
pub struct InMemoryVectorStore {
    chunks: RwLock<Vec<Chunk>>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            snapshot_path: None,
        }
    }

    /// Loads the snapshot at `path` if it exists; every later mutation
    /// rewrites it.
    pub async fn with_snapshot(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let chunks = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<Chunk>>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        log::info!("Loaded {} chunks from {}", chunks.len(), path.display());

        Ok(Self {
            chunks: RwLock::new(chunks),
            snapshot_path: Some(path),
        })
    }

    async fn persist(&self, chunks: &[Chunk]) -> Result<()> {
        if let Some(path) = &self.snapshot_path {
            write_json_atomically(path, &chunks).await?;
        }
        Ok(())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<usize> {
        let added = chunks.len();
        let mut stored = self.chunks.write().await;

        // Re-adding a chunk id replaces the old entry.
        let ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let replaced: Vec<Chunk> = stored.iter().filter(|c| ids.contains(c.id.as_str())).cloned().collect();
        stored.retain(|c| !ids.contains(c.id.as_str()));
        let kept = stored.len();
        stored.extend(chunks);

        if let Err(e) = self.persist(&stored).await {
            stored.truncate(kept);
            stored.extend(replaced);
            return Err(e);
        }
        Ok(added)
    }

    async fn similarity_search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let stored = self.chunks.read().await;
        let mut scored: Vec<ScoredChunk> = stored
            .iter()
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(query_embedding, &chunk.embedding),
                chunk: chunk.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut stored = self.chunks.write().await;
        let (removed, kept): (Vec<Chunk>, Vec<Chunk>) =
            std::mem::take(&mut *stored).into_iter().partition(|c| c.document_id == document_id);
        *stored = kept;
        if removed.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.persist(&stored).await {
            stored.extend(removed);
            return Err(e);
        }
        Ok(removed.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().await.len())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .chunks
            .read()
            .await
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn clear(&self) -> Result<usize> {
        let mut stored = self.chunks.write().await;
        let removed = std::mem::take(&mut *stored);
        if let Err(e) = self.persist(&stored).await {
            *stored = removed;
            return Err(e);
        }
        Ok(removed.len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

pub(crate) async fn write_json_atomically<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec(value)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkPayload {
    chunk_id: String,
    document_id: String,
    filename: String,
    chunk_index: usize,
    content: String,
}

impl ChunkPayload {
    fn into_chunk(self, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: self.chunk_id,
            document_id: self.document_id,
            filename: self.filename,
            chunk_index: self.chunk_index,
            content: self.content,
            embedding,
        }
    }
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct QdrantScoredPoint {
    score: f32,
    payload: Option<ChunkPayload>,
}

#[derive(Deserialize)]
struct QdrantRecord {
    payload: Option<ChunkPayload>,
}

#[derive(Deserialize)]
struct QdrantScrollResult {
    points: Vec<QdrantRecord>,
    next_page_offset: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct QdrantCount {
    count: usize,
}

/// Chunks stored as points in a Qdrant collection, accessed over its REST API.
pub struct QdrantVectorStore {
    client: Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    collection_ready: Mutex<bool>,
}

impl QdrantVectorStore {
    pub fn new(client: Client, base_url: String, collection: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
            api_key,
            collection_ready: Mutex::new(false),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    fn point_id(chunk_id: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes())
    }

    fn document_filter(document_id: &str) -> serde_json::Value {
        json!({ "must": [{ "key": "document_id", "match": { "value": document_id } }] })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Option<reqwest::Response>> {
        let response = self.authorize(request).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::VectorStore(format!("Qdrant {}: {}", status, error_text)));
        }
        Ok(Some(response))
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        let mut ready = self.collection_ready.lock().await;
        if *ready {
            return Ok(());
        }

        if self.send(self.client.get(self.url(""))).await?.is_none() {
            log::info!(
                "Creating Qdrant collection {} ({} dimensions)",
                self.collection,
                dimensions
            );
            let body = json!({ "vectors": { "size": dimensions, "distance": "Cosine" } });
            self.send(self.client.put(self.url("")).json(&body))
                .await?
                .ok_or_else(|| RagError::VectorStore("collection creation returned 404".to_string()))?;
        }

        *ready = true;
        Ok(())
    }

    async fn scroll(&self, filter: Option<serde_json::Value>) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        let mut offset: Option<serde_json::Value> = None;

        loop {
            let mut body = json!({ "limit": 256, "with_payload": true, "with_vector": false });
            if let Some(filter) = &filter {
                body["filter"] = filter.clone();
            }
            if let Some(offset) = &offset {
                body["offset"] = offset.clone();
            }

            let Some(response) = self
                .send(self.client.post(self.url("/points/scroll")).json(&body))
                .await?
            else {
                return Ok(chunks);
            };
            let page: QdrantResponse<QdrantScrollResult> = response.json().await?;
            chunks.extend(
                page.result
                    .points
                    .into_iter()
                    .filter_map(|p| p.payload)
                    .map(|p| p.into_chunk(Vec::new())),
            );

            match page.result.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => return Ok(chunks),
            }
        }
    }

    async fn count_matching(&self, filter: Option<serde_json::Value>) -> Result<usize> {
        let mut body = json!({ "exact": true });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }
        match self
            .send(self.client.post(self.url("/points/count")).json(&body))
            .await?
        {
            Some(response) => {
                let parsed: QdrantResponse<QdrantCount> = response.json().await?;
                Ok(parsed.result.count)
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<usize> {
        let Some(first) = chunks.first() else {
            return Ok(0);
        };
        self.ensure_collection(first.embedding.len()).await?;

        let points: Vec<serde_json::Value> = chunks
            .iter()
            .map(|chunk| {
                let payload = ChunkPayload {
                    chunk_id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    filename: chunk.filename.clone(),
                    chunk_index: chunk.chunk_index,
                    content: chunk.content.clone(),
                };
                json!({
                    "id": Self::point_id(&chunk.id),
                    "vector": &chunk.embedding,
                    "payload": payload,
                })
            })
            .collect();

        self.send(
            self.client
                .put(self.url("/points?wait=true"))
                .json(&json!({ "points": points })),
        )
        .await?
        .ok_or_else(|| RagError::VectorStore(format!("collection {} missing", self.collection)))?;

        log::info!("Upserted {} points into {}", chunks.len(), self.collection);
        Ok(chunks.len())
    }

    async fn similarity_search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let body = json!({ "vector": query_embedding, "limit": k, "with_payload": true });
        let Some(response) = self
            .send(self.client.post(self.url("/points/search")).json(&body))
            .await?
        else {
            return Ok(Vec::new());
        };

        let parsed: QdrantResponse<Vec<QdrantScoredPoint>> = response.json().await?;
        Ok(parsed
            .result
            .into_iter()
            .filter_map(|point| {
                point.payload.map(|payload| ScoredChunk {
                    chunk: payload.into_chunk(Vec::new()),
                    score: point.score,
                })
            })
            .collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let filter = Self::document_filter(document_id);
        let matching = self.count_matching(Some(filter.clone())).await?;
        if matching == 0 {
            return Ok(0);
        }

        self.send(
            self.client
                .post(self.url("/points/delete?wait=true"))
                .json(&json!({ "filter": filter })),
        )
        .await?;
        Ok(matching)
    }

    async fn count(&self) -> Result<usize> {
        self.count_matching(None).await
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let mut chunks = self.scroll(Some(Self::document_filter(document_id))).await?;
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn clear(&self) -> Result<usize> {
        let removed = self.count_matching(None).await?;
        self.send(self.client.delete(self.url(""))).await?;
        *self.collection_ready.lock().await = false;
        log::info!("Dropped Qdrant collection {} ({} points)", self.collection, removed);
        Ok(removed)
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
