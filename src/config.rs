use std::env;
use std::path::PathBuf;
use thiserror::Error;

pub const DATA_DIR: &str = "data/docs";
pub const VECTORSTORE_DIR: &str = "vectorstore";

pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const CHAT_MODEL: &str = "gpt-3.5-turbo-1106";

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
/// Paragraph, line, word, then any character
pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];
pub const DEFAULT_TOP_K: usize = 5;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const UNSTRUCTURED_URL: &str = "https://api.unstructuredapp.io/general/v0/general";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid chunk size: {0} (must be greater than zero)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid top k: {0} (must be greater than zero)")]
    InvalidTopK(usize),
}

/// Credentials and endpoints for the OpenAI-compatible model API
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
}

/// Credentials and endpoint for the Unstructured partition API
#[derive(Debug, Clone)]
pub struct UnstructuredConfig {
    pub api_key: String,
    pub url: String,
}

/// Configuration for Qdrant
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

/// Everything the pipeline needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub vectorstore_dir: PathBuf,
    pub openai: OpenAiConfig,
    /// `None` means files are partitioned locally
    pub unstructured: Option<UnstructuredConfig>,
    pub qdrant: QdrantConfig,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
    pub top_k: usize,
}

impl Settings {
    /// Create the settings from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create the settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let openai_key =
            non_empty("OPENAI_API_KEY").ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;

        let unstructured = non_empty("UNSTRUCTURED_API_KEY").map(|api_key| UnstructuredConfig {
            api_key,
            url: UNSTRUCTURED_URL.to_string(),
        });

        let qdrant = QdrantConfig {
            url: non_empty("QDRANT_URL").unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            api_key: non_empty("QDRANT_API_KEY"),
        };

        let settings = Settings {
            data_dir: PathBuf::from(DATA_DIR),
            vectorstore_dir: PathBuf::from(VECTORSTORE_DIR),
            openai: OpenAiConfig {
                api_key: openai_key,
                base_url: OPENAI_BASE_URL.to_string(),
                embedding_model: EMBEDDING_MODEL.to_string(),
                chat_model: CHAT_MODEL.to_string(),
            },
            unstructured,
            qdrant,
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
            separators: SEPARATORS.iter().map(|s| s.to_string()).collect(),
            top_k: DEFAULT_TOP_K,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunk_overlap,
                self.chunk_size,
            ));
        }
        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }
        Ok(())
    }
}
