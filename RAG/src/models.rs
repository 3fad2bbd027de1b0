use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processed,
}

/// An uploaded file known to the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub file_size: usize,
    pub file_type: String,
    pub upload_time: DateTime<Utc>,
    pub status: DocumentStatus,
    pub chunk_count: usize,
    pub stored_path: PathBuf,
}

/// Public view of a document, as returned by the upload and list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentInfo {
    pub id: String,
    pub filename: String,
    pub file_size: usize,
    pub upload_time: DateTime<Utc>,
    pub status: DocumentStatus,
    pub chunk_count: usize,
}

impl From<&DocumentRecord> for DocumentInfo {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            id: record.id.clone(),
            filename: record.filename.clone(),
            file_size: record.file_size,
            upload_time: record.upload_time,
            status: record.status,
            chunk_count: record.chunk_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub filename: String,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
        format!("{}_{}", document_id, chunk_index)
    }
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// A retrieved chunk as reported back to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub document_id: String,
    pub filename: String,
    pub chunk_index: usize,
    pub preview: String,
    pub score: f32,
}

impl From<&ScoredChunk> for Source {
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            document_id: scored.chunk.document_id.clone(),
            filename: scored.chunk.filename.clone(),
            chunk_index: scored.chunk.chunk_index,
            preview: preview(&scored.chunk.content, 200),
            score: scored.score,
        }
    }
}

/// A chunk returned by a plain search, with its full text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub document_id: String,
    pub filename: String,
    pub chunk_index: usize,
    pub content: String,
    pub content_preview: String,
    pub score: f32,
}

impl From<ScoredChunk> for SearchHit {
    fn from(scored: ScoredChunk) -> Self {
        Self {
            content_preview: preview(&scored.chunk.content, 300),
            document_id: scored.chunk.document_id,
            filename: scored.chunk.filename,
            chunk_index: scored.chunk.chunk_index,
            content: scored.chunk.content,
            score: scored.score,
        }
    }
}

/// Result of wiping every document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClearedDocuments {
    pub documents: usize,
    pub chunks: usize,
    pub sessions: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user_message: String,
    pub assistant_response: String,
    pub timestamp: DateTime<Utc>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub documents: usize,
    pub chunks: usize,
    pub sessions: usize,
    pub vector_store: String,
    pub embedding_model: String,
    pub chat_model: String,
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_short_text() {
        assert_eq!(preview("short", 200), "short");
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        let text = "é".repeat(300);
        let p = preview(&text, 200);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 203);
    }

    #[test]
    fn search_hit_keeps_full_content() {
        let hit = SearchHit::from(ScoredChunk {
            chunk: Chunk {
                id: "d_0".into(),
                document_id: "d".into(),
                filename: "long.txt".into(),
                chunk_index: 0,
                content: "x".repeat(400),
                embedding: vec![],
            },
            score: 0.5,
        });
        assert_eq!(hit.content.len(), 400);
        assert_eq!(hit.content_preview.chars().count(), 303);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentStatus::Processed).unwrap();
        assert_eq!(json, "\"processed\"");
    }
}
