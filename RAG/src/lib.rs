pub mod config;
pub mod document_processor;
pub mod document_registry;
pub mod embedding_service;
pub mod error;
pub mod llm_service;
pub mod models;
pub mod notes_service;
pub mod rag_engine;
pub mod session_store;
pub mod vector_store;

pub use config::RagConfig;
pub use document_processor::DocumentProcessor;
pub use embedding_service::{Embedder, HashingEmbedder, OpenAiEmbedder};
pub use error::{RagError, Result};
pub use llm_service::{ChatModel, ExtractiveChatModel, GeminiChatModel, OpenAiChatModel};
pub use models::*;
pub use notes_service::NotesService;
pub use rag_engine::RagEngine;
pub use vector_store::{InMemoryVectorStore, QdrantVectorStore, VectorStore};
