pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluate;
pub mod explain;
pub mod ingest;
pub mod models;
pub mod ollama;
pub mod qdrant_store;
pub mod quiz;
pub mod repair;
pub mod resolver;
pub mod retrieval;
pub mod session;
pub mod tutor;

pub use config::AppConfig;
pub use error::{TutorError, TutorResult};
pub use tutor::TutorService;

use anyhow::Result;

use crate::db::Database;
use crate::ollama::{OllamaClient, OllamaEmbedder, OllamaGenerator};
use crate::qdrant_store::QdrantStore;
use crate::retrieval::RetrievalEngine;

/// Production tutor: Ollama models, Qdrant index, SQLite sessions and message log.
pub type LiveTutor = TutorService<OllamaEmbedder, QdrantStore, OllamaGenerator, Database>;

pub fn live_engine(config: &AppConfig) -> RetrievalEngine<OllamaEmbedder, QdrantStore> {
    let ollama = OllamaClient::new(config.ollama_base_url.clone());
    RetrievalEngine::new(
        OllamaEmbedder::new(ollama, config.models.embedding_model.clone()),
        QdrantStore::new(
            config.qdrant_base_url.clone(),
            config.qdrant_collection.clone(),
        ),
    )
}

pub async fn live_tutor(config: &AppConfig, db: Database) -> Result<LiveTutor> {
    let catalog = catalog::load(Some(&config.catalog_path()))?;
    let generator = OllamaGenerator::new(
        OllamaClient::new(config.ollama_base_url.clone()),
        config.models.answer_model.clone(),
        config.models.max_output_tokens,
    );

    Ok(
        TutorService::new(catalog, live_engine(config), generator, db.clone())
            .with_message_log(db)
            .with_top_k(config.retrieval_top_k),
    )
}
