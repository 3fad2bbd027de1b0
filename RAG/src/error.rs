use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Unsupported file type '{extension}'. Supported: {supported}")]
    UnsupportedFileType { extension: String, supported: String },

    #[error("File too large ({size} bytes). Maximum size: {max_mb:.1}MB")]
    FileTooLarge { size: usize, max_mb: f64 },

    #[error("No text could be extracted from '{0}'")]
    EmptyDocument(String),

    #[error("Failed to extract text from '{filename}': {reason}")]
    Extraction { filename: String, reason: String },

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding API error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("LLM API error ({status}): {message}")]
    Llm { status: u16, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Request URLs are stripped before wrapping; they can carry credentials.
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Http(err.without_url())
    }
}

impl RagError {
    /// Errors caused by the caller's input rather than by this service or
    /// one of its upstreams.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RagError::UnsupportedFileType { .. }
                | RagError::FileTooLarge { .. }
                | RagError::EmptyDocument(_)
                | RagError::Extraction { .. }
                | RagError::InvalidRequest(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RagError::DocumentNotFound(_) | RagError::SessionNotFound(_)
        )
    }

    /// Short machine-readable tag used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::UnsupportedFileType { .. } => "unsupported_file_type",
            RagError::FileTooLarge { .. } => "file_too_large",
            RagError::EmptyDocument(_) => "empty_document",
            RagError::Extraction { .. } => "extraction_failed",
            RagError::DocumentNotFound(_) => "document_not_found",
            RagError::SessionNotFound(_) => "session_not_found",
            RagError::InvalidRequest(_) => "invalid_request",
            RagError::Config(_) => "config",
            RagError::Embedding(_) => "embedding_failed",
            RagError::VectorStore(_) => "vector_store_failed",
            RagError::Llm { .. } => "llm_failed",
            RagError::Io(_) => "io",
            RagError::Http(_) => "upstream_unreachable",
            RagError::Serialization(_) => "serialization",
        }
    }
}
