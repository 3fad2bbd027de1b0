use crate::config::{EmbeddingProvider, LlmProvider, RagConfig, VectorStoreBackend};
use crate::document_processor::DocumentProcessor;
use crate::document_registry::DocumentRegistry;
use crate::embedding_service::{Embedder, HashingEmbedder, OpenAiEmbedder};
use crate::error::{RagError, Result};
use crate::llm_service::{ChatModel, ExtractiveChatModel, GeminiChatModel, OpenAiChatModel};
use crate::models::{
    Chunk, ChatReply, ChatTurn, ClearedDocuments, DocumentInfo, DocumentRecord, DocumentStatus,
    SearchHit, Stats,
};
use crate::rag_engine::{RagEngine, RetrievalSettings};
use crate::session_store::SessionStore;
use crate::vector_store::{InMemoryVectorStore, QdrantVectorStore, VectorStore};
use chrono::Utc;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const REGISTRY_FILE: &str = "documents.json";
const INDEX_FILE: &str = "index.json";

/// Everything the HTTP layer needs: uploads, retrieval-backed chat, sessions
/// and document bookkeeping.
pub struct NotesService {
    config: RagConfig,
    processor: DocumentProcessor,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    engine: RagEngine,
    registry: DocumentRegistry,
    sessions: SessionStore,
}

impl NotesService {
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        chat_model: Arc<dyn ChatModel>,
        registry: DocumentRegistry,
    ) -> Self {
        let settings = RetrievalSettings {
            max_results: config.max_retrieved_docs,
            similarity_threshold: config.similarity_threshold,
            history_turns: config.history_turns,
        };
        let engine = RagEngine::new(embedder.clone(), vector_store.clone(), chat_model, settings);

        Self {
            processor: DocumentProcessor::from_config(&config),
            config,
            embedder,
            vector_store,
            engine,
            registry,
            sessions: SessionStore::new(),
        }
    }

    /// Wires up the providers selected in `config` and reloads any persisted
    /// registry and index.
    pub async fn from_config(config: RagConfig) -> Result<Self> {
        let client = Client::new();

        let embedder: Arc<dyn Embedder> = match &config.embedding {
            EmbeddingProvider::OpenAi { api_key } => Arc::new(OpenAiEmbedder::new(
                client.clone(),
                api_key.clone(),
                config.openai_base_url.clone(),
                config.embedding_model.clone(),
            )),
            EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::default()),
        };

        let vector_store: Arc<dyn VectorStore> = match &config.vector_store {
            VectorStoreBackend::Memory => Arc::new(
                InMemoryVectorStore::with_snapshot(config.vector_db_dir.join(INDEX_FILE)).await?,
            ),
            VectorStoreBackend::Qdrant {
                url,
                collection,
                api_key,
            } => Arc::new(QdrantVectorStore::new(
                client.clone(),
                url.clone(),
                collection.clone(),
                api_key.clone(),
            )),
        };

        let chat_model: Arc<dyn ChatModel> = match &config.llm {
            LlmProvider::OpenAi { api_key } => Arc::new(OpenAiChatModel::new(
                client.clone(),
                api_key.clone(),
                config.openai_base_url.clone(),
                config.chat_model.clone(),
                config.max_tokens,
                config.temperature,
            )),
            LlmProvider::Gemini { api_key } => Arc::new(GeminiChatModel::new(
                client,
                api_key.clone(),
                config.gemini_base_url.clone(),
                config.chat_model.clone(),
                config.max_tokens,
                config.temperature,
            )),
            LlmProvider::Extractive => Arc::new(ExtractiveChatModel::new()),
        };

        tokio::fs::create_dir_all(&config.uploads_dir).await?;
        let registry = DocumentRegistry::with_manifest(config.uploads_dir.join(REGISTRY_FILE)).await?;

        log::info!(
            "Notes service ready: {} embeddings, {} index, {} chat model, {:.1}MB upload limit",
            embedder.model_name(),
            vector_store.name(),
            chat_model.model_name(),
            config.max_file_size_mb()
        );

        Ok(Self::new(config, embedder, vector_store, chat_model, registry))
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub async fn upload_document(&self, filename: &str, bytes: Vec<u8>) -> Result<DocumentInfo> {
        let filename = sanitize_filename(filename)?;
        let file_type = self.processor.validate(&filename, bytes.len())?;

        let document_id = Uuid::new_v4().to_string();
        let stored_path = self.config.uploads_dir.join(format!("{}_{}", document_id, filename));
        tokio::fs::create_dir_all(&self.config.uploads_dir).await?;
        tokio::fs::write(&stored_path, &bytes).await?;

        match self.ingest(&document_id, &filename, bytes, &stored_path).await {
            Ok(record) => {
                log::info!(
                    "Uploaded {} as {} ({} {}, {} chunks)",
                    filename,
                    document_id,
                    record.file_size,
                    file_type.extension(),
                    record.chunk_count
                );
                Ok(DocumentInfo::from(&record))
            }
            Err(e) => {
                log::error!("Failed to ingest {}: {}", filename, e);
                self.discard(&document_id, &stored_path).await;
                Err(e)
            }
        }
    }

    async fn ingest(
        &self,
        document_id: &str,
        filename: &str,
        bytes: Vec<u8>,
        stored_path: &Path,
    ) -> Result<DocumentRecord> {
        let file_size = bytes.len();
        let processor = self.processor.clone();
        let name = filename.to_string();
        let processed = tokio::task::spawn_blocking(move || processor.process(&name, &bytes))
            .await
            .map_err(|e| RagError::Extraction {
                filename: filename.to_string(),
                reason: e.to_string(),
            })??;

        let embeddings = self.embedder.embed_documents(&processed.chunks).await?;
        if embeddings.len() != processed.chunks.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                processed.chunks.len(),
                embeddings.len()
            )));
        }

        let chunks: Vec<Chunk> = processed
            .chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (content, embedding))| Chunk {
                id: Chunk::chunk_id(document_id, chunk_index),
                document_id: document_id.to_string(),
                filename: filename.to_string(),
                chunk_index,
                content,
                embedding,
            })
            .collect();
        let chunk_count = self.vector_store.add_chunks(chunks).await?;

        let record = DocumentRecord {
            id: document_id.to_string(),
            filename: filename.to_string(),
            file_size,
            file_type: processed.file_type.extension().to_string(),
            upload_time: Utc::now(),
            status: DocumentStatus::Processed,
            chunk_count,
            stored_path: stored_path.to_path_buf(),
        };
        self.registry.insert(record.clone()).await?;
        Ok(record)
    }

    async fn discard(&self, document_id: &str, stored_path: &Path) {
        if let Err(e) = self.vector_store.delete_document(document_id).await {
            log::error!("Failed to remove vectors of {}: {}", document_id, e);
        }
        if let Err(e) = tokio::fs::remove_file(stored_path).await {
            log::error!("Failed to remove {}: {}", stored_path.display(), e);
        }
    }

    pub async fn list_documents(&self) -> Vec<DocumentInfo> {
        self.registry.list().await.iter().map(DocumentInfo::from).collect()
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        let record = self
            .registry
            .get(document_id)
            .await
            .ok_or_else(|| RagError::DocumentNotFound(document_id.to_string()))?;

        let removed = self.vector_store.delete_document(document_id).await?;
        match tokio::fs::remove_file(&record.stored_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Stored file {} was already gone", record.stored_path.display());
            }
            Err(e) => return Err(e.into()),
        }
        self.registry.remove(document_id).await?;

        log::info!("Deleted {} ({}), {} chunks removed", record.filename, document_id, removed);
        Ok(())
    }

    pub async fn chat(&self, message: &str, session_id: Option<&str>) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(RagError::InvalidRequest("message must not be empty".to_string()));
        }

        let session_id = SessionStore::resolve_id(session_id);
        let history = self.sessions.turns(&session_id).await;
        let answer = self.engine.answer(message, &history).await?;

        let timestamp = Utc::now();
        self.sessions
            .append(
                &session_id,
                ChatTurn {
                    user_message: message.to_string(),
                    assistant_response: answer.answer.clone(),
                    timestamp,
                    sources: answer.sources.clone(),
                },
            )
            .await;

        Ok(ChatReply {
            response: answer.answer,
            session_id,
            timestamp,
            sources: answer.sources,
            usage: answer.usage,
        })
    }

    /// Top `k` chunks for `query` without asking the model.
    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidRequest("query must not be empty".to_string()));
        }
        if k == Some(0) {
            return Err(RagError::InvalidRequest("k must be at least 1".to_string()));
        }

        let results = self.engine.retrieve(query, k).await?;
        Ok(results.into_iter().map(SearchHit::from).collect())
    }

    /// Removes every document, its vectors and stored file, and all chat
    /// sessions.
    pub async fn clear_documents(&self) -> Result<ClearedDocuments> {
        let chunks = self.vector_store.clear().await?;
        let records = self.registry.clear().await?;
        for record in &records {
            if let Err(e) = tokio::fs::remove_file(&record.stored_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::error!("Failed to remove {}: {}", record.stored_path.display(), e);
                }
            }
        }
        let sessions = self.sessions.clear().await;

        log::info!(
            "Cleared {} documents ({} chunks) and {} sessions",
            records.len(),
            chunks,
            sessions
        );
        Ok(ClearedDocuments {
            documents: records.len(),
            chunks,
            sessions,
        })
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        self.sessions.history(session_id).await
    }

    pub async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.sessions.delete(session_id).await?;
        log::info!("Cleared chat session {}", session_id);
        Ok(())
    }

    pub async fn summarize(&self, document_id: &str) -> Result<String> {
        if self.registry.get(document_id).await.is_none() {
            return Err(RagError::DocumentNotFound(document_id.to_string()));
        }
        self.engine.summarize(document_id).await
    }

    pub async fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            documents: self.registry.len().await,
            chunks: self.vector_store.count().await?,
            sessions: self.sessions.len().await,
            vector_store: self.vector_store.name().to_string(),
            embedding_model: self.embedder.model_name().to_string(),
            chat_model: self.engine.chat_model_name().to_string(),
        })
    }
}

/// Keeps only the final path component so uploads cannot escape the
/// uploads directory.
fn sanitize_filename(filename: &str) -> Result<String> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or_default();

    if name.is_empty() || name == "." || name == ".." {
        return Err(RagError::InvalidRequest(format!("invalid filename '{}'", filename)));
    }
    Ok(name.to_string())
}
