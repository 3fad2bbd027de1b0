use crate::error::{RagError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const SUPPORTED_FILE_TYPES: &[&str] = &["pdf", "docx", "txt", "md"];

#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    OpenAi { api_key: String },
    Gemini { api_key: String },
    Extractive,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingProvider {
    OpenAi { api_key: String },
    Hashing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VectorStoreBackend {
    Memory,
    Qdrant {
        url: String,
        collection: String,
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub uploads_dir: PathBuf,
    pub vector_db_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_file_size: usize,
    pub max_retrieved_docs: usize,
    pub similarity_threshold: f32,
    pub history_turns: usize,
    pub llm: LlmProvider,
    pub chat_model: String,
    pub embedding: EmbeddingProvider,
    pub embedding_model: String,
    pub openai_base_url: String,
    pub gemini_base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub vector_store: VectorStoreBackend,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for RagConfig {
    /// Offline configuration: hashing embedder, in-memory index and the
    /// extractive answerer. Nothing here needs network access.
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            vector_db_dir: PathBuf::from("vector_db"),
            chunk_size: 1000,
            chunk_overlap: 200,
            max_file_size: 50 * 1024 * 1024,
            max_retrieved_docs: 4,
            similarity_threshold: 0.0,
            history_turns: 5,
            llm: LlmProvider::Extractive,
            chat_model: "extractive".to_string(),
            embedding: EmbeddingProvider::Hashing,
            embedding_model: "text-embedding-3-small".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            max_tokens: 2000,
            temperature: 0.1,
            vector_store: VectorStoreBackend::Memory,
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

impl RagConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Empty
    /// values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let openai_key = get("OPENAI_API_KEY");
        let gemini_key = get("GEMINI_API_KEY");

        let llm = match get("LLM_PROVIDER").map(|v| v.to_lowercase()) {
            Some(name) => match name.as_str() {
                "openai" => LlmProvider::OpenAi {
                    api_key: require(openai_key.clone(), "OPENAI_API_KEY")?,
                },
                "gemini" => LlmProvider::Gemini {
                    api_key: require(gemini_key.clone(), "GEMINI_API_KEY")?,
                },
                "extractive" => LlmProvider::Extractive,
                other => {
                    return Err(RagError::Config(format!(
                        "Unknown LLM_PROVIDER '{}'",
                        other
                    )))
                }
            },
            None => match (&openai_key, &gemini_key) {
                (Some(key), _) => LlmProvider::OpenAi {
                    api_key: key.clone(),
                },
                (None, Some(key)) => LlmProvider::Gemini {
                    api_key: key.clone(),
                },
                (None, None) => LlmProvider::Extractive,
            },
        };

        let embedding = match get("EMBEDDING_PROVIDER").map(|v| v.to_lowercase()) {
            Some(name) => match name.as_str() {
                "openai" => EmbeddingProvider::OpenAi {
                    api_key: require(openai_key.clone(), "OPENAI_API_KEY")?,
                },
                "hashing" => EmbeddingProvider::Hashing,
                other => {
                    return Err(RagError::Config(format!(
                        "Unknown EMBEDDING_PROVIDER '{}'",
                        other
                    )))
                }
            },
            None => match &openai_key {
                Some(key) => EmbeddingProvider::OpenAi {
                    api_key: key.clone(),
                },
                None => EmbeddingProvider::Hashing,
            },
        };

        let default_chat_model = match llm {
            LlmProvider::OpenAi { .. } => "gpt-3.5-turbo",
            LlmProvider::Gemini { .. } => "gemini-2.5-flash",
            LlmProvider::Extractive => "extractive",
        };

        let vector_store = match get("VECTOR_STORE").map(|v| v.to_lowercase()) {
            None => VectorStoreBackend::Memory,
            Some(name) if name == "memory" => VectorStoreBackend::Memory,
            Some(name) if name == "qdrant" => VectorStoreBackend::Qdrant {
                url: get("QDRANT_URL").unwrap_or_else(|| "http://localhost:6333".to_string()),
                collection: get("QDRANT_COLLECTION")
                    .unwrap_or_else(|| "notes_collection".to_string()),
                api_key: get("QDRANT_API_KEY"),
            },
            Some(other) => {
                return Err(RagError::Config(format!(
                    "Unknown VECTOR_STORE '{}'",
                    other
                )))
            }
        };

        let chunk_size = parse_or(get("CHUNK_SIZE"), "CHUNK_SIZE", defaults.chunk_size)?;
        let chunk_overlap = parse_or(get("CHUNK_OVERLAP"), "CHUNK_OVERLAP", defaults.chunk_overlap)?;
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "CHUNK_OVERLAP ({}) must be smaller than a non-zero CHUNK_SIZE ({})",
                chunk_overlap, chunk_size
            )));
        }

        let cors_origins = match get("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        Ok(Self {
            uploads_dir: get("UPLOADS_DIR").map(PathBuf::from).unwrap_or(defaults.uploads_dir),
            vector_db_dir: get("VECTOR_DB_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.vector_db_dir),
            chunk_size,
            chunk_overlap,
            max_file_size: parse_or(get("MAX_FILE_SIZE"), "MAX_FILE_SIZE", defaults.max_file_size)?,
            max_retrieved_docs: parse_or(
                get("MAX_RETRIEVED_DOCS"),
                "MAX_RETRIEVED_DOCS",
                defaults.max_retrieved_docs,
            )?,
            similarity_threshold: parse_or(
                get("SIMILARITY_THRESHOLD"),
                "SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            history_turns: parse_or(get("HISTORY_TURNS"), "HISTORY_TURNS", defaults.history_turns)?,
            chat_model: get("CHAT_MODEL").unwrap_or_else(|| default_chat_model.to_string()),
            llm,
            embedding,
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            openai_base_url: get("OPENAI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_base_url),
            gemini_base_url: get("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_base_url),
            max_tokens: parse_or(get("MAX_TOKENS"), "MAX_TOKENS", defaults.max_tokens)?,
            temperature: parse_or(get("TEMPERATURE"), "TEMPERATURE", defaults.temperature)?,
            vector_store,
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(get("PORT"), "PORT", defaults.port)?,
            cors_origins,
        })
    }

    pub fn max_file_size_mb(&self) -> f64 {
        self.max_file_size as f64 / 1024.0 / 1024.0
    }
}

fn require(value: Option<String>, key: &str) -> Result<String> {
    value.ok_or_else(|| RagError::Config(format!("{} environment variable not set", key)))
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RagError::Config(format!("Invalid value for {}: '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<RagConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RagConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn no_keys_means_offline_providers() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.llm, LlmProvider::Extractive);
        assert_eq!(config.embedding, EmbeddingProvider::Hashing);
        assert_eq!(config.vector_store, VectorStoreBackend::Memory);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.max_retrieved_docs, 4);
    }

    #[test]
    fn openai_key_selects_openai_for_both() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert!(matches!(config.llm, LlmProvider::OpenAi { .. }));
        assert!(matches!(config.embedding, EmbeddingProvider::OpenAi { .. }));
        assert_eq!(config.chat_model, "gpt-3.5-turbo");
    }

    #[test]
    fn gemini_key_selects_gemini_chat_with_local_embeddings() {
        let config = config_from(&[("GEMINI_API_KEY", "g-test")]).unwrap();
        assert!(matches!(config.llm, LlmProvider::Gemini { .. }));
        assert_eq!(config.embedding, EmbeddingProvider::Hashing);
        assert_eq!(config.chat_model, "gemini-2.5-flash");
    }

    #[test]
    fn explicit_provider_without_key_fails() {
        let err = config_from(&[("LLM_PROVIDER", "openai")]).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(config_from(&[("CHUNK_SIZE", "lots")]).is_err());
        assert!(config_from(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "100")]).is_err());
    }

    #[test]
    fn qdrant_backend_reads_connection_settings() {
        let config = config_from(&[
            ("VECTOR_STORE", "qdrant"),
            ("QDRANT_URL", "http://qdrant:6333"),
        ])
        .unwrap();
        assert_eq!(
            config.vector_store,
            VectorStoreBackend::Qdrant {
                url: "http://qdrant:6333".to_string(),
                collection: "notes_collection".to_string(),
                api_key: None,
            }
        );
    }

    #[test]
    fn cors_origins_are_split_on_commas() {
        let config = config_from(&[("CORS_ORIGINS", "http://a.test, http://b.test,")]).unwrap();
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn upload_limit_and_gemini_endpoint() {
        let config = config_from(&[
            ("MAX_FILE_SIZE", "5242880"),
            ("GEMINI_BASE_URL", "http://localhost:9000/v1beta/"),
        ])
        .unwrap();
        assert!((config.max_file_size_mb() - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.gemini_base_url, "http://localhost:9000/v1beta");

        let defaults = config_from(&[]).unwrap();
        assert_eq!(
            defaults.gemini_base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
    }
}
