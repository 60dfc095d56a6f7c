pub mod filter;
pub mod pdf;
pub mod splitter;

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::{TutorError, TutorResult};
use crate::models::{IngestManifest, IngestRequest, IngestStatus, PageBlocks, PageRecord, TextChunk};
use crate::repair::{repair, strip_boilerplate};
use crate::retrieval::{Embedder, RetrievalEngine, VectorIndex};

use self::filter::{classify_block, clean_line, BlockKind};
use self::pdf::{PageSource, PdfPages};
use self::splitter::TextSplitter;

pub const DEFAULT_MIN_PAGES: usize = 3;

#[derive(Debug, Clone)]
pub struct PdfChunker {
    splitter: TextSplitter,
    min_pages: usize,
}

impl Default for PdfChunker {
    fn default() -> Self {
        Self::new(TextSplitter::default(), DEFAULT_MIN_PAGES)
    }
}

impl PdfChunker {
    pub fn new(splitter: TextSplitter, min_pages: usize) -> Self {
        Self {
            splitter,
            min_pages,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            TextSplitter::new(config.chunking.target_chars, config.chunking.overlap_chars),
            config.chunking.min_content_pages,
        )
    }

    pub fn min_pages(&self) -> usize {
        self.min_pages
    }

    pub async fn extract_pages<S: PageSource>(
        &self,
        source: &S,
        max_pages: Option<usize>,
    ) -> Result<Vec<PageRecord>> {
        let mut pages = source.pages().await?;
        pages.sort_by_key(|page| page.page_number);
        if let Some(max) = max_pages {
            pages.truncate(max);
        }

        let total = pages.len();
        let records: Vec<PageRecord> = pages.into_iter().filter_map(page_record).collect();
        tracing::info!(
            source = %source.source_name(),
            pages = total,
            content_pages = records.len(),
            "extracted pages"
        );
        Ok(records)
    }

    pub fn chunk_records(&self, records: &[PageRecord], source_name: &str) -> Vec<TextChunk> {
        records
            .iter()
            .flat_map(|record| {
                self.splitter
                    .split(&record.content)
                    .into_iter()
                    .map(move |content| TextChunk {
                        word_count: content.split_whitespace().count(),
                        content,
                        page_number: record.page_number,
                        source_path: source_name.to_string(),
                    })
            })
            .collect()
    }

    pub async fn process<S: PageSource>(
        &self,
        source: &S,
        max_pages: Option<usize>,
    ) -> Result<Vec<TextChunk>> {
        let records = self.extract_pages(source, max_pages).await?;
        if records.len() < self.min_pages {
            tracing::info!(
                content_pages = records.len(),
                required = self.min_pages,
                "not enough content pages; nothing to chunk"
            );
            return Ok(vec![]);
        }

        let chunks = self.chunk_records(&records, &source.source_name());
        tracing::info!(chunks = chunks.len(), "chunked source");
        Ok(chunks)
    }
}

pub fn page_record(page: PageBlocks) -> Option<PageRecord> {
    let mut blocks = page.blocks;
    blocks.sort_by(|a, b| {
        a.y.partial_cmp(&b.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut parts = Vec::new();
    for block in &blocks {
        let kind = classify_block(&block.text);
        if kind != BlockKind::Content {
            tracing::trace!(page = page.page_number, ?kind, "skipping block");
            continue;
        }

        let cleaned = block
            .text
            .lines()
            .map(clean_line)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let text = strip_boilerplate(&repair(&cleaned));
        let text = text.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
    }

    if parts.is_empty() {
        return None;
    }

    let content = parts.join("\n\n");
    Some(PageRecord {
        page_number: page.page_number,
        word_count: content.split_whitespace().count(),
        content,
    })
}

#[derive(Clone)]
pub struct Ingestor<E, V> {
    db: Database,
    chunker: PdfChunker,
    engine: RetrievalEngine<E, V>,
}

#[derive(Debug, Clone)]
pub struct IngestResult {
    pub chunk_count: i64,
    pub page_count: usize,
    pub skipped: bool,
}

impl<E: Embedder, V: VectorIndex> Ingestor<E, V> {
    pub fn new(db: Database, chunker: PdfChunker, engine: RetrievalEngine<E, V>) -> Self {
        Self {
            db,
            chunker,
            engine,
        }
    }

    pub async fn ingest<F>(&self, request: IngestRequest, progress: F) -> TutorResult<IngestResult>
    where
        F: FnMut(IngestStatus) + Send,
    {
        let pdf_hash = file_sha256(&request.pdf_path).await?;
        let source = PdfPages::new(&request.pdf_path);
        self.ingest_source(
            &source,
            &source_key(&pdf_hash, request.max_pages),
            request.rebuild,
            request.max_pages,
            progress,
        )
        .await
    }

    pub async fn ingest_source<S, F>(
        &self,
        source: &S,
        source_key: &str,
        rebuild: bool,
        max_pages: Option<usize>,
        mut progress: F,
    ) -> TutorResult<IngestResult>
    where
        S: PageSource,
        F: FnMut(IngestStatus) + Send,
    {
        let mut status = IngestStatus {
            stage: "checking_manifest".to_string(),
            message: None,
            chunk_count: 0,
        };
        progress(status.clone());

        if !rebuild {
            if let Some(latest) = self.db.latest_manifest().await? {
                if latest.pdf_hash == source_key {
                    status.stage = "skipped_unchanged".to_string();
                    status.message = Some("Source unchanged; skipped re-ingest.".to_string());
                    status.chunk_count = latest.chunk_count;
                    progress(status.clone());

                    return Ok(IngestResult {
                        chunk_count: latest.chunk_count,
                        page_count: 0,
                        skipped: true,
                    });
                }
            }
        }

        status.stage = "extracting_pages".to_string();
        progress(status.clone());

        let records = self.chunker.extract_pages(source, max_pages).await?;
        if records.len() < self.chunker.min_pages() {
            return Err(TutorError::Processing {
                path: source.source_name(),
                pages: records.len(),
                required: self.chunker.min_pages(),
            });
        }

        status.stage = "chunking".to_string();
        progress(status.clone());

        let chunks = self.chunker.chunk_records(&records, &source.source_name());
        if chunks.is_empty() {
            return Err(TutorError::Processing {
                path: source.source_name(),
                pages: 0,
                required: self.chunker.min_pages(),
            });
        }
        status.chunk_count = chunks.len() as i64;

        status.stage = "embedding_and_indexing".to_string();
        progress(status.clone());

        let indexed = self.engine.index_chunks(&chunks).await? as i64;

        self.db
            .record_manifest(&IngestManifest {
                pdf_hash: source_key.to_string(),
                created_at: Utc::now(),
                chunk_count: indexed,
            })
            .await?;

        status.stage = "done".to_string();
        status.chunk_count = indexed;
        progress(status);

        tracing::info!(pages = records.len(), chunks = indexed, "ingest complete");
        Ok(IngestResult {
            chunk_count: indexed,
            page_count: records.len(),
            skipped: false,
        })
    }
}

pub fn source_key(pdf_hash: &str, max_pages: Option<usize>) -> String {
    match max_pages {
        Some(max) => format!("{pdf_hash}:{max}"),
        None => pdf_hash.to_string(),
    }
}

async fn file_sha256(path: &str) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed reading file for hash: {}", path))?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
