use crate::chunking::ChunkingConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-pro";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_INDEX_DIR: &str = "faiss_index";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything the pipeline needs to reach the hosted models and the local
/// index. Built once at start-up and handed to each component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub top_k: usize,
    pub index_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            chunking: ChunkingConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl AppConfig {
    /// Sets the credential, treating blank values as absent.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });
        self
    }

    pub fn index_file(&self) -> PathBuf {
        crate::index::index_file_path(&self.index_dir)
    }
}
