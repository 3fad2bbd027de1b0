use chrono::{DateTime, Utc};
use notes_rag::{ChatTurn, ClearedDocuments, DocumentInfo, SearchHit};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchPayload {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub message: String,
    #[serde(flatten)]
    pub cleared: ClearedDocuments,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DocumentList {
    pub documents: Vec<DocumentInfo>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub document_id: String,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
