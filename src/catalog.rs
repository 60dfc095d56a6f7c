use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::Deserialize;

use crate::error::{TutorError, TutorResult};
use crate::models::{Chapter, KeywordEntry};

const BUNDLED_CATALOG: &str = include_str!("../data/keywords.json");

static CATALOG: OnceLock<Arc<KeywordCatalog>> = OnceLock::new();

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    chapters: BTreeMap<String, RawChapter>,
    #[serde(default)]
    keywords: Vec<KeywordEntry>,
}

#[derive(Debug, Deserialize)]
struct RawChapter {
    title: String,
    page_range: (u32, u32),
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChapterIndex {
    chapters: Vec<Chapter>,
}

impl ChapterIndex {
    pub fn new(mut chapters: Vec<Chapter>) -> TutorResult<Self> {
        chapters.sort_by_key(|chapter| chapter.page_range);

        for chapter in &chapters {
            if chapter.page_range.0 > chapter.page_range.1 {
                return Err(TutorError::Catalog(format!(
                    "chapter {} has an inverted page range {:?}",
                    chapter.id, chapter.page_range
                )));
            }
        }

        for pair in chapters.windows(2) {
            if pair[0].page_range.1 >= pair[1].page_range.0 {
                return Err(TutorError::Catalog(format!(
                    "chapters {} and {} have overlapping page ranges",
                    pair[0].id, pair[1].id
                )));
            }
        }

        Ok(Self { chapters })
    }

    pub fn get(&self, id: &str) -> Option<&Chapter> {
        let id = id.trim();
        self.chapters.iter().find(|chapter| chapter.id == id)
    }

    pub fn chapter_for_page(&self, page: u32) -> Option<&str> {
        self.chapters
            .iter()
            .find(|chapter| chapter.contains_page(page))
            .map(|chapter| chapter.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chapter> {
        self.chapters.iter()
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeywordCatalog {
    index: ChapterIndex,
    entries: Vec<KeywordEntry>,
}

impl KeywordCatalog {
    pub fn new(chapters: Vec<Chapter>, entries: Vec<KeywordEntry>) -> TutorResult<Self> {
        let index = ChapterIndex::new(chapters)?;
        let mut merged: Vec<KeywordEntry> = Vec::with_capacity(entries.len());

        for entry in entries {
            let word = entry.word.trim();
            if word.is_empty() {
                continue;
            }
            match merged
                .iter_mut()
                .find(|existing| existing.word.eq_ignore_ascii_case(word))
            {
                Some(existing) => {
                    existing.pages.extend(entry.pages);
                    existing.pages.sort_unstable();
                    existing.pages.dedup();
                }
                None => {
                    let mut pages = entry.pages;
                    pages.sort_unstable();
                    pages.dedup();
                    merged.push(KeywordEntry {
                        word: word.to_string(),
                        pages,
                    });
                }
            }
        }

        // Chapter keywords without page data still take part in matching.
        for chapter in index.iter() {
            for keyword in &chapter.keywords {
                if !merged
                    .iter()
                    .any(|entry| entry.word.eq_ignore_ascii_case(keyword))
                {
                    merged.push(KeywordEntry {
                        word: keyword.clone(),
                        pages: vec![],
                    });
                }
            }
        }

        Ok(Self {
            index,
            entries: merged,
        })
    }

    pub fn from_json(text: &str) -> TutorResult<Self> {
        let raw: RawCatalog =
            serde_json::from_str(text).map_err(|err| TutorError::Catalog(err.to_string()))?;

        let chapters = raw
            .chapters
            .into_iter()
            .map(|(id, chapter)| {
                let mut keywords: Vec<String> = Vec::with_capacity(chapter.keywords.len());
                for keyword in chapter.keywords {
                    let keyword = keyword.trim().to_string();
                    if !keyword.is_empty() && !keywords.contains(&keyword) {
                        keywords.push(keyword);
                    }
                }
                Chapter {
                    id: id.trim().to_string(),
                    title: chapter.title,
                    page_range: chapter.page_range,
                    keywords,
                }
            })
            .collect();

        Self::new(chapters, raw.keywords)
    }

    pub fn from_path(path: &Path) -> TutorResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            TutorError::Catalog(format!("failed reading {}: {err}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn bundled() -> TutorResult<Self> {
        Self::from_json(BUNDLED_CATALOG)
    }

    pub fn index(&self) -> &ChapterIndex {
        &self.index
    }

    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    pub fn chapter(&self, id: &str) -> Option<&Chapter> {
        self.index.get(id)
    }

    pub fn chapter_for_page(&self, page: u32) -> Option<&str> {
        self.index.chapter_for_page(page)
    }

    pub fn chapters_for_entry(&self, entry: &KeywordEntry) -> Vec<&Chapter> {
        let word = entry.word.to_lowercase();
        self.index
            .iter()
            .filter(|chapter| {
                chapter
                    .keywords
                    .iter()
                    .any(|keyword| keyword.to_lowercase() == word)
                    || entry.pages.iter().any(|page| chapter.contains_page(*page))
            })
            .collect()
    }

    pub fn chapters_for_word(&self, word: &str) -> Vec<&Chapter> {
        let word = word.trim();
        self.entries
            .iter()
            .find(|entry| entry.word.eq_ignore_ascii_case(word))
            .map(|entry| self.chapters_for_entry(entry))
            .unwrap_or_default()
    }

    pub fn chapter_query(&self, id: &str) -> Option<String> {
        let chapter = self.chapter(id)?;
        let mut parts = vec![chapter.title.clone()];
        parts.extend(chapter.keywords.iter().cloned());
        Some(parts.join(" "))
    }

    pub fn related_words(&self, text: &str, limit: usize) -> Vec<String> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return vec![];
        }

        self.entries
            .iter()
            .filter(|entry| {
                let word = entry.word.to_lowercase();
                text.contains(&word) || word.contains(&text)
            })
            .map(|entry| entry.word.clone())
            .take(limit)
            .collect()
    }
}

/// Returns the process-wide catalog, loading it on first use.
pub fn load(path: Option<&Path>) -> TutorResult<Arc<KeywordCatalog>> {
    if let Some(catalog) = CATALOG.get() {
        return Ok(catalog.clone());
    }

    let catalog = match path {
        Some(path) if path.exists() => {
            tracing::info!("loading keyword catalog from {}", path.display());
            KeywordCatalog::from_path(path)?
        }
        _ => KeywordCatalog::bundled()?,
    };

    tracing::info!(
        chapters = catalog.index().len(),
        keywords = catalog.entries().len(),
        "keyword catalog loaded"
    );

    let _ = CATALOG.set(Arc::new(catalog));
    CATALOG
        .get()
        .cloned()
        .ok_or_else(|| TutorError::Catalog("catalog initialisation raced and lost".to_string()))
}

#[cfg(test)]
pub(crate) fn test_catalog() -> KeywordCatalog {
    let chapters = vec![
        Chapter {
            id: "2".to_string(),
            title: "변수".to_string(),
            page_range: (1, 2),
            keywords: vec!["변수".to_string(), "형변환".to_string(), "int".to_string()],
        },
        Chapter {
            id: "3".to_string(),
            title: "연산자".to_string(),
            page_range: (3, 3),
            keywords: vec!["연산자".to_string(), "산술 연산자".to_string()],
        },
        Chapter {
            id: "5".to_string(),
            title: "배열".to_string(),
            page_range: (4, 5),
            keywords: vec!["배열".to_string(), "배열의 길이".to_string()],
        },
    ];
    let entries = vec![
        KeywordEntry {
            word: "변수".to_string(),
            pages: vec![1],
        },
        KeywordEntry {
            word: "배열".to_string(),
            pages: vec![4],
        },
        KeywordEntry {
            word: "배열의 길이".to_string(),
            pages: vec![4, 5],
        },
    ];
    KeywordCatalog::new(chapters, entries).expect("valid test catalog")
}
