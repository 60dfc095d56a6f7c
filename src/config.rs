use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub answer_model: String,
    pub embedding_model: String,
    pub max_output_tokens: usize,
}

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
    pub target_chars: usize,
    pub overlap_chars: usize,
    pub min_content_pages: usize,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub textbook_pdf: Option<PathBuf>,
    pub keyword_catalog: Option<PathBuf>,
    pub ollama_base_url: String,
    pub qdrant_base_url: String,
    pub qdrant_collection: String,
    pub retrieval_top_k: usize,
    pub models: ModelConfig,
    pub chunking: ChunkingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env::var("TUTOR_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        Self {
            data_dir,
            textbook_pdf: env::var("TEXTBOOK_PDF").ok().map(PathBuf::from),
            keyword_catalog: env::var("KEYWORD_CATALOG").ok().map(PathBuf::from),
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
            qdrant_base_url: env::var("QDRANT_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:6333".to_string()),
            qdrant_collection: env::var("QDRANT_COLLECTION")
                .unwrap_or_else(|_| "java_textbook".to_string()),
            retrieval_top_k: env_or("RETRIEVAL_TOP_K", 5),
            models: ModelConfig {
                answer_model: env::var("ANSWER_MODEL")
                    .unwrap_or_else(|_| "qwen2.5:14b-instruct".to_string()),
                embedding_model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "mxbai-embed-large".to_string()),
                max_output_tokens: env_or("MAX_OUTPUT_TOKENS", 800),
            },
            chunking: ChunkingConfig {
                target_chars: env_or("CHUNK_TARGET_CHARS", 1_000),
                overlap_chars: env_or("CHUNK_OVERLAP_CHARS", 200),
                min_content_pages: env_or("MIN_CONTENT_PAGES", 3),
            },
        }
    }

    /// Configured catalog file, else `keywords.json` in the data dir.
    pub fn catalog_path(&self) -> PathBuf {
        self.keyword_catalog
            .clone()
            .unwrap_or_else(|| self.data_dir.join("keywords.json"))
    }

    pub fn sqlite_dsn(&self) -> String {
        format!("sqlite://{}", self.data_dir.join("tutor.sqlite3").display())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
