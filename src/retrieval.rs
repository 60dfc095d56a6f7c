use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use crate::models::{RetrievalResult, TextChunk};

const UPSERT_BATCH: usize = 64;

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

pub trait VectorIndex: Send + Sync {
    fn reset(&self, dimensions: usize) -> impl Future<Output = Result<()>> + Send;

    fn index(&self, entries: &[(TextChunk, Vec<f32>)]) -> impl Future<Output = Result<()>> + Send;

    fn knn_search(
        &self,
        vector: &[f32],
        k: usize,
    ) -> impl Future<Output = Result<Vec<RetrievalResult>>> + Send;
}

#[derive(Clone)]
pub struct RetrievalEngine<E, V> {
    embedder: E,
    index: V,
}

impl<E: Embedder, V: VectorIndex> RetrievalEngine<E, V> {
    pub fn new(embedder: E, index: V) -> Self {
        Self { embedder, index }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub async fn index_chunks(&self, chunks: &[TextChunk]) -> Result<usize> {
        let mut entries = Vec::with_capacity(chunks.len());
        for (idx, chunk) in chunks.iter().enumerate() {
            let vector = self
                .embedder
                .embed(&chunk.content)
                .await
                .with_context(|| format!("failed embedding chunk {idx} (page {})", chunk.page_number))?;
            entries.push((chunk.clone(), vector));
        }

        let Some((_, first)) = entries.first() else {
            return Ok(0);
        };
        self.index.reset(first.len()).await?;

        for batch in entries.chunks(UPSERT_BATCH) {
            self.index.index(batch).await?;
        }

        tracing::info!(chunks = entries.len(), "indexed chunks");
        Ok(entries.len())
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let vector = self.embedder.embed(query).await?;
        let mut hits = self.index.knn_search(&vector, k).await?;
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);

        tracing::debug!(hits = hits.len(), "retrieval complete");
        Ok(hits)
    }
}

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let chars: Vec<char> = text
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        for c in &chars {
            vector[self.bucket(&(*c,))] += 1.0;
        }
        for pair in chars.windows(2) {
            vector[self.bucket(&(pair[0], pair[1]))] += 2.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }

    fn bucket<T: Hash>(&self, feature: &T) -> usize {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        (hasher.finish() % self.dimensions as u64) as usize
    }
}

impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            anyhow::bail!("cannot embed empty text input");
        }
        Ok(self.embed_sync(text))
    }
}

#[derive(Clone, Default)]
pub struct MemoryIndex {
    entries: Arc<RwLock<Vec<(TextChunk, Vec<f32>)>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl VectorIndex for MemoryIndex {
    async fn reset(&self, _dimensions: usize) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn index(&self, entries: &[(TextChunk, Vec<f32>)]) -> Result<()> {
        self.entries.write().await.extend_from_slice(entries);
        Ok(())
    }

    async fn knn_search(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let entries = self.entries.read().await;
        let mut hits: Vec<RetrievalResult> = entries
            .iter()
            .map(|(chunk, stored)| RetrievalResult {
                chunk: chunk.clone(),
                score: cosine_similarity(vector, stored),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
