pub mod error;
pub mod payloads;
pub mod routes;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use routes::SharedService;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Room left for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn build_router(service: SharedService) -> Router {
    let config = service.config();
    let body_limit = body_limit(config.max_file_size);
    let cors = cors_layer(&config.cors_origins);

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/upload", post(routes::upload))
        .route("/api/chat", post(routes::chat))
        .route("/api/search", post(routes::search))
        .route(
            "/api/documents",
            get(routes::list_documents).delete(routes::clear_documents),
        )
        .route("/api/documents/:id", delete(routes::delete_document))
        .route("/api/documents/:id/summary", get(routes::document_summary))
        .route("/api/sessions/:id/history", get(routes::session_history))
        .route("/api/sessions/:id", delete(routes::clear_session))
        .route("/api/stats", get(routes::stats))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(middleware::from_fn(log_requests))
        .with_state(service)
}

fn body_limit(max_file_size: usize) -> usize {
    max_file_size.saturating_add(MULTIPART_OVERHEAD)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    log::info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}
