use crate::error::ApiError;
use crate::payloads::{
    ChatPayload, ClearResponse, DocumentList, HealthResponse, HistoryResponse, MessageResponse,
    SearchPayload, SearchResponse, SummaryResponse,
};
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    Json,
};
use chrono::Utc;
use notes_rag::{ChatReply, DocumentInfo, NotesService, Stats};
use std::sync::Arc;

pub type SharedService = Arc<NotesService>;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Accepts a single multipart field named `file`; other fields are ignored.
pub async fn upload(
    State(service): State<SharedService>,
    mut multipart: Multipart,
) -> Result<Json<DocumentInfo>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("missing_filename", "file field has no filename"))?;
        let bytes = field.bytes().await?;

        let info = service.upload_document(&filename, bytes.to_vec()).await?;
        return Ok(Json(info));
    }

    Err(ApiError::bad_request(
        "missing_file",
        "multipart field 'file' is required",
    ))
}

pub async fn chat(
    State(service): State<SharedService>,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(payload) = payload?;
    let reply = service
        .chat(&payload.message, payload.session_id.as_deref())
        .await?;
    Ok(Json(reply))
}

pub async fn list_documents(State(service): State<SharedService>) -> Json<DocumentList> {
    Json(DocumentList {
        documents: service.list_documents().await,
    })
}

pub async fn clear_documents(
    State(service): State<SharedService>,
) -> Result<Json<ClearResponse>, ApiError> {
    let cleared = service.clear_documents().await?;
    Ok(Json(ClearResponse {
        message: "All documents and conversation history cleared successfully".to_string(),
        cleared,
    }))
}

pub async fn search(
    State(service): State<SharedService>,
    payload: Result<Json<SearchPayload>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(payload) = payload?;
    let results = service.search(&payload.query, payload.k).await?;
    Ok(Json(SearchResponse {
        query: payload.query,
        results,
    }))
}

pub async fn delete_document(
    State(service): State<SharedService>,
    Path(document_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    service.delete_document(&document_id).await?;
    Ok(Json(MessageResponse::new("Document deleted successfully")))
}

pub async fn document_summary(
    State(service): State<SharedService>,
    Path(document_id): Path<String>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let summary = service.summarize(&document_id).await?;
    Ok(Json(SummaryResponse {
        document_id,
        summary,
    }))
}

pub async fn session_history(
    State(service): State<SharedService>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = service.history(&session_id).await?;
    Ok(Json(HistoryResponse {
        session_id,
        history,
    }))
}

pub async fn clear_session(
    State(service): State<SharedService>,
    Path(session_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    service.clear_session(&session_id).await?;
    Ok(Json(MessageResponse::new("Session cleared successfully")))
}

pub async fn stats(State(service): State<SharedService>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(service.stats().await?))
}
