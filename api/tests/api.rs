use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use notes_api::build_router;
use notes_rag::{NotesService, RagConfig};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "notes-test-boundary";

const NOTES: &str = "The Treaty of Westphalia was signed in 1648 and ended the Thirty Years War.\n\n\
    It established the principle of state sovereignty across Europe.";

async fn app() -> (Router, TempDir) {
    app_with_limit(4096).await
}

async fn app_with_limit(max_file_size: usize) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = RagConfig {
        uploads_dir: dir.path().join("uploads"),
        vector_db_dir: dir.path().join("vector_db"),
        max_file_size,
        ..RagConfig::default()
    };
    let service = NotesService::from_config(config).await.unwrap();
    (build_router(Arc::new(service)), dir)
}

fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn upload(app: &Router, field: &str, filename: &str, content: &[u8]) -> (StatusCode, Value) {
    let request = Request::post("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(field, filename, content)))
        .unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    send(app, request).await
}

async fn chat(app: &Router, payload: Value) -> (StatusCode, Value) {
    post_json(app, "/api/chat", payload).await
}

#[tokio::test]
async fn health_reports_healthy() {
    let (app, _dir) = app().await;
    let (status, body) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn upload_accepts_text_and_markdown() {
    let (app, _dir) = app().await;

    let (status, body) = upload(&app, "file", "history.txt", NOTES.as_bytes()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "history.txt");
    assert_eq!(body["status"], "processed");
    assert!(body["chunk_count"].as_u64().unwrap() >= 1);

    let (status, body) = upload(&app, "file", "todo.md", b"# Todo\n\n- revise the treaty notes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "todo.md");

    let (_, list) = get(&app, "/api/documents").await;
    assert_eq!(list["documents"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn upload_rejects_bad_files() {
    let (app, _dir) = app().await;

    let (status, body) = upload(&app, "file", "photo.png", b"\x89PNG").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported_file_type");

    let (status, body) = upload(&app, "file", "huge.txt", &vec![b'a'; 8192]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "file_too_large");

    let (status, body) = upload(&app, "document", "notes.txt", NOTES.as_bytes()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_file");

    let (_, list) = get(&app, "/api/documents").await;
    assert!(list["documents"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_body_is_rejected_before_processing() {
    let (app, _dir) = app().await;
    let content = vec![b'a'; 4096 + 1024 * 1024 + 1];

    let (status, _) = upload(&app, "file", "huge.txt", &content).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (_, list) = get(&app, "/api/documents").await;
    assert!(list["documents"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn upload_accepts_docx() {
    use docx_rs::{Docx, Paragraph, Run};

    let (app, _dir) = app_with_limit(256 * 1024).await;
    let docx = Docx::new()
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Lecture 4: Enzymes")))
        .add_paragraph(
            Paragraph::new().add_run(Run::new().add_text("Enzymes lower the activation energy of reactions.")),
        );
    let mut cursor = Cursor::new(Vec::new());
    docx.build().pack(&mut cursor).unwrap();

    let (status, body) = upload(&app, "file", "lecture.docx", &cursor.into_inner()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "lecture.docx");
    assert_eq!(body["status"], "processed");
    assert!(body["chunk_count"].as_u64().unwrap() >= 1);

    let (status, body) = post_json(&app, "/api/search", json!({ "query": "activation energy" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["filename"], "lecture.docx");
}

#[tokio::test]
async fn search_returns_ranked_chunks() {
    let (app, _dir) = app().await;
    upload(&app, "file", "history.txt", NOTES.as_bytes()).await;

    let (status, body) = post_json(&app, "/api/search", json!({ "query": "state sovereignty", "k": 1 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "state sovereignty");
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["filename"], "history.txt");
    assert!(results[0]["content"].as_str().unwrap().contains("sovereignty"));
    assert!(results[0]["score"].as_f64().unwrap() > 0.0);

    let (status, body) = post_json(&app, "/api/search", json!({ "query": " " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (_, stats) = get(&app, "/api/stats").await;
    assert_eq!(stats["sessions"], 0);
}

#[tokio::test]
async fn clearing_documents_removes_everything() {
    let (app, _dir) = app().await;
    upload(&app, "file", "history.txt", NOTES.as_bytes()).await;
    upload(&app, "file", "todo.md", b"# Todo\n\n- revise the treaty notes").await;
    chat(&app, json!({ "message": "When was the treaty signed?" })).await;

    let clear = Request::delete("/api/documents").body(Body::empty()).unwrap();
    let (status, body) = send(&app, clear).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents"], 2);
    assert_eq!(body["sessions"], 1);
    assert!(body["chunks"].as_u64().unwrap() >= 2);

    let (_, list) = get(&app, "/api/documents").await;
    assert!(list["documents"].as_array().unwrap().is_empty());
    let (_, stats) = get(&app, "/api/stats").await;
    assert_eq!(stats["documents"], 0);
    assert_eq!(stats["sessions"], 0);
}

#[tokio::test]
async fn chat_returns_session_and_sources() {
    let (app, _dir) = app().await;
    upload(&app, "file", "history.txt", NOTES.as_bytes()).await;

    let (status, body) = chat(&app, json!({ "message": "When was the Treaty of Westphalia signed?" })).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["session_id"].as_str().unwrap().to_string();
    assert!(!session_id.is_empty());
    assert!(body["response"].as_str().unwrap().contains("1648"));
    assert_eq!(body["sources"][0]["filename"], "history.txt");

    let (status, body) = chat(
        &app,
        json!({ "message": "What principle did it establish?", "session_id": session_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], session_id.as_str());

    let (status, body) = get(&app, &format!("/api/sessions/{session_id}/history")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn blank_or_malformed_chat_is_rejected() {
    let (app, _dir) = app().await;

    let (status, body) = chat(&app, json!({ "message": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (status, body) = chat(&app, json!({ "text": "hello" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_json");
}

#[tokio::test]
async fn delete_removes_document_from_list() {
    let (app, _dir) = app().await;
    let (_, uploaded) = upload(&app, "file", "history.txt", NOTES.as_bytes()).await;
    let id = uploaded["id"].as_str().unwrap();

    let delete = Request::delete(format!("/api/documents/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Document deleted successfully");

    let (_, list) = get(&app, "/api/documents").await;
    assert!(list["documents"].as_array().unwrap().is_empty());

    let again = Request::delete(format!("/api/documents/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, again).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "document_not_found");
}

#[tokio::test]
async fn summary_of_uploaded_document() {
    let (app, _dir) = app().await;
    let (_, uploaded) = upload(&app, "file", "history.txt", NOTES.as_bytes()).await;
    let id = uploaded["id"].as_str().unwrap();

    let (status, body) = get(&app, &format!("/api/documents/{id}/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["document_id"], id);
    assert!(!body["summary"].as_str().unwrap().is_empty());

    let (status, _) = get(&app, "/api/documents/unknown/summary").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_session_history_is_not_found() {
    let (app, _dir) = app().await;
    let (status, body) = get(&app, "/api/sessions/does-not-exist/history").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "session_not_found");
}

#[tokio::test]
async fn cleared_session_loses_history() {
    let (app, _dir) = app().await;
    let (_, body) = chat(&app, json!({ "message": "hello" })).await;
    let session_id = body["session_id"].as_str().unwrap();

    let clear = Request::delete(format!("/api/sessions/{session_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, clear).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(&app, &format!("/api/sessions/{session_id}/history")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_count_documents_and_sessions() {
    let (app, _dir) = app().await;
    upload(&app, "file", "history.txt", NOTES.as_bytes()).await;
    chat(&app, json!({ "message": "Who signed the treaty?" })).await;

    let (status, body) = get(&app, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents"], 1);
    assert_eq!(body["sessions"], 1);
    assert_eq!(body["vector_store"], "memory");
    assert_eq!(body["chat_model"], "extractive");
}
