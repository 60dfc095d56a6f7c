use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::catalog::KeywordCatalog;
use crate::models::{KeywordEntry, PageHit};

pub const DEFAULT_QUERY: &str = "Java 프로그래밍";
pub const DEFAULT_PAGE_RESULTS: usize = 10;

const FUZZY_THRESHOLD: f32 = 0.6;
const EXACT_POINTS: u32 = 3;
const PARTIAL_POINTS: u32 = 1;

static CHAPTER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"챕터\s*(\d+)",
        r"chapter\s*(\d+)",
        r"(\d+)장",
        r"(\d+)챕터",
        r"^(\d+)$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static CHAPTER_TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(챕터|chapter)\s*\d+|\d+(챕터|장)|^\d+$").ok()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    WordBoundary,
    Substring,
    Fuzzy,
}

impl MatchTier {
    pub const ALL: [MatchTier; 4] = [
        MatchTier::Exact,
        MatchTier::WordBoundary,
        MatchTier::Substring,
        MatchTier::Fuzzy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::WordBoundary => "word_boundary",
            MatchTier::Substring => "substring",
            MatchTier::Fuzzy => "fuzzy",
        }
    }

    fn matches(self, candidate: &str, word: &str) -> bool {
        match self {
            MatchTier::Exact => candidate == word,
            MatchTier::WordBoundary => {
                candidate == word
                    || word.starts_with(&format!("{candidate} "))
                    || word.ends_with(&format!(" {candidate}"))
                    || word.contains(&format!(" {candidate} "))
            }
            MatchTier::Substring => word.contains(candidate) || candidate.contains(word),
            MatchTier::Fuzzy => char_overlap(candidate, word) > FUZZY_THRESHOLD,
        }
    }

    fn points(self) -> u32 {
        match self {
            MatchTier::Exact => EXACT_POINTS,
            _ => PARTIAL_POINTS,
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub query: String,
    pub chapter: Option<String>,
    pub tier: Option<MatchTier>,
    pub explicit_chapter: bool,
    pub matched_keywords: Vec<String>,
}

impl Resolution {
    fn fallback(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            chapter: None,
            tier: None,
            explicit_chapter: false,
            matched_keywords: vec![],
        }
    }
}

#[derive(Clone)]
pub struct KeywordResolver {
    catalog: Arc<KeywordCatalog>,
}

impl KeywordResolver {
    pub fn new(catalog: Arc<KeywordCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &KeywordCatalog {
        &self.catalog
    }

    pub fn resolve(&self, user_input: &str) -> Resolution {
        let normalized = normalize(user_input);
        if normalized.is_empty() {
            return Resolution::fallback(DEFAULT_QUERY);
        }

        if let Some(resolution) = self.resolve_explicit_chapter(&normalized) {
            tracing::debug!(
                chapter = resolution.chapter.as_deref().unwrap_or_default(),
                "explicit chapter reference"
            );
            return resolution;
        }

        let candidates = candidates(&normalized);
        let Some((tier, hits)) = self.cascade(&candidates) else {
            tracing::debug!(input = %normalized, "no catalog match; using raw input");
            return Resolution::fallback(user_input.trim());
        };

        let mut matched_keywords: Vec<String> = Vec::new();
        let mut scores: BTreeMap<(u32, String), u32> = BTreeMap::new();
        let mut scored: HashSet<(usize, String)> = HashSet::new();

        for (candidate_idx, entry) in &hits {
            if !matched_keywords.contains(&entry.word) {
                matched_keywords.push(entry.word.clone());
            }
            for chapter in self.catalog.chapters_for_entry(entry) {
                if scored.insert((*candidate_idx, chapter.id.clone())) {
                    *scores
                        .entry((chapter.ordinal(), chapter.id.clone()))
                        .or_insert(0) += tier.points();
                }
            }
        }

        // Equal scores go to the lowest chapter number.
        let best = scores
            .iter()
            .filter(|(_, score)| **score > 0)
            .max_by(|(a_key, a_score), (b_key, b_score)| {
                a_score.cmp(b_score).then_with(|| b_key.cmp(a_key))
            })
            .map(|((_, id), _)| id.clone());

        let Some(chapter_id) = best else {
            let mut resolution = Resolution::fallback(user_input.trim());
            resolution.tier = Some(tier);
            resolution.matched_keywords = matched_keywords;
            return resolution;
        };

        let mut query = self
            .catalog
            .chapter_query(&chapter_id)
            .unwrap_or_else(|| user_input.trim().to_string());
        if let Some(chapter) = self.catalog.chapter(&chapter_id) {
            for word in &matched_keywords {
                if !chapter.keywords.iter().any(|k| k.eq_ignore_ascii_case(word))
                    && !chapter.title.eq_ignore_ascii_case(word)
                {
                    query.push(' ');
                    query.push_str(word);
                }
            }
        }

        tracing::debug!(chapter = %chapter_id, %tier, "resolved keyword input");

        Resolution {
            query,
            chapter: Some(chapter_id),
            tier: Some(tier),
            explicit_chapter: false,
            matched_keywords,
        }
    }

    pub fn search_pages(&self, keyword: &str, max_results: usize) -> Vec<PageHit> {
        let normalized = normalize(keyword);
        if normalized.is_empty() {
            return vec![];
        }

        let Some((_, hits)) = self.cascade(&[normalized]) else {
            return vec![];
        };

        hits.into_iter()
            .take(max_results)
            .map(|(_, entry)| {
                let chapter = entry
                    .pages
                    .first()
                    .and_then(|page| self.catalog.chapter_for_page(*page))
                    .map(str::to_string)
                    .or_else(|| {
                        self.catalog
                            .chapters_for_entry(entry)
                            .first()
                            .map(|chapter| chapter.id.clone())
                    });
                PageHit {
                    word: entry.word.clone(),
                    pages: entry.pages.clone(),
                    chapter,
                }
            })
            .collect()
    }

    fn resolve_explicit_chapter(&self, normalized: &str) -> Option<Resolution> {
        let number = CHAPTER_PATTERNS.iter().find_map(|pattern| {
            pattern
                .captures(normalized)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        })?;

        let chapter = self.catalog.chapter(&number.to_string())?;
        let mut query = self.catalog.chapter_query(&chapter.id)?;

        let residual = match CHAPTER_TOKEN.as_ref() {
            Some(token) => token.replace_all(normalized, " ").into_owned(),
            None => String::new(),
        };
        let residual = residual.split_whitespace().collect::<Vec<_>>().join(" ");
        if !residual.is_empty() {
            query.push(' ');
            query.push_str(&residual);
        }

        Some(Resolution {
            query,
            chapter: Some(chapter.id.clone()),
            tier: None,
            explicit_chapter: true,
            matched_keywords: chapter.keywords.clone(),
        })
    }

    fn cascade<'a>(&'a self, candidates: &[String]) -> Option<(MatchTier, Vec<(usize, &'a KeywordEntry)>)> {
        let entries = self.catalog.entries();
        let lowered: Vec<String> = entries.iter().map(|e| e.word.to_lowercase()).collect();

        for tier in MatchTier::ALL {
            let mut hits = Vec::new();
            for (idx, candidate) in candidates.iter().enumerate() {
                // Loose tiers on one-character tokens match almost everything.
                if tier >= MatchTier::Substring && candidate.chars().count() < 2 {
                    continue;
                }
                for (entry, word) in entries.iter().zip(&lowered) {
                    if tier.matches(candidate, word) {
                        hits.push((idx, entry));
                    }
                }
            }
            if !hits.is_empty() {
                return Some((tier, hits));
            }
        }

        None
    }
}

pub fn enhance_query(query: &str) -> String {
    format!("Java {} 프로그래밍 예제 문제", query.trim())
}

fn normalize(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn candidates(normalized: &str) -> Vec<String> {
    let mut out = vec![normalized.to_string()];
    for token in normalized.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        if !token.is_empty() && !out.iter().any(|existing| existing == token) {
            out.push(token.to_string());
        }
    }
    out
}

fn char_overlap(candidate: &str, word: &str) -> f32 {
    let longest = candidate.chars().count().max(word.chars().count());
    if longest == 0 {
        return 0.0;
    }
    let shared = candidate.chars().filter(|c| word.contains(*c)).count();
    shared as f32 / longest as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_catalog;

    fn resolver() -> KeywordResolver {
        KeywordResolver::new(Arc::new(test_catalog()))
    }

    #[test]
    fn chapter_number_forms_agree() {
        let resolver = resolver();
        let ids: Vec<Option<String>> = ["챕터 3", "3장", "3", "Chapter 3", "3챕터"]
            .iter()
            .map(|input| resolver.resolve(input).chapter)
            .collect();
        assert!(ids.iter().all(|id| id.as_deref() == Some("3")), "{ids:?}");
        assert!(resolver.resolve("3장").explicit_chapter);
    }

    #[test]
    fn explicit_chapter_builds_query_from_catalog() {
        let resolution = resolver().resolve("챕터 5 문제 내줘");
        assert_eq!(resolution.chapter.as_deref(), Some("5"));
        assert!(resolution.query.starts_with("배열 배열 배열의 길이"));
        assert!(resolution.query.ends_with("문제 내줘"));
    }

    #[test]
    fn unknown_chapter_number_falls_through() {
        let resolution = resolver().resolve("챕터 42");
        assert!(!resolution.explicit_chapter);
        assert_eq!(resolution.chapter, None);
    }

    #[test]
    fn exact_catalog_word_hits_first_tier() {
        let resolver = resolver();
        for word in ["배열", "변수", "형변환", "배열의 길이"] {
            let resolution = resolver.resolve(word);
            assert_eq!(resolution.tier, Some(MatchTier::Exact), "{word}");
        }
        assert_eq!(resolver.resolve("배열").chapter.as_deref(), Some("5"));
    }

    #[test]
    fn lower_tiers_apply_in_order() {
        let resolver = resolver();
        let boundary = resolver.resolve("산술");
        assert_eq!(boundary.tier, Some(MatchTier::WordBoundary));
        assert_eq!(boundary.chapter.as_deref(), Some("3"));

        let substring = resolver.resolve("변환");
        assert_eq!(substring.tier, Some(MatchTier::Substring));
        assert_eq!(substring.chapter.as_deref(), Some("2"));
    }

    #[test]
    fn fuzzy_overlap_ratio() {
        assert!(char_overlap("연산잦", "연산자") > FUZZY_THRESHOLD);
        assert!(char_overlap("클래스", "배열") <= FUZZY_THRESHOLD);
        assert_eq!(char_overlap("", ""), 0.0);
    }

    #[test]
    fn no_match_returns_raw_input() {
        let resolution = resolver().resolve("  람다식 ");
        assert_eq!(resolution.query, "람다식");
        assert_eq!(resolution.chapter, None);
        assert_eq!(resolution.tier, None);
    }

    #[test]
    fn empty_input_uses_default_query() {
        assert_eq!(resolver().resolve("   ").query, DEFAULT_QUERY);
    }

    #[test]
    fn ties_go_to_lowest_chapter_id() {
        let catalog = KeywordCatalog::new(
            vec![
                crate::models::Chapter {
                    id: "7".to_string(),
                    title: "b".to_string(),
                    page_range: (1, 5),
                    keywords: vec!["공통".to_string()],
                },
                crate::models::Chapter {
                    id: "4".to_string(),
                    title: "a".to_string(),
                    page_range: (6, 9),
                    keywords: vec!["공통".to_string()],
                },
            ],
            vec![],
        )
        .expect("catalog");
        let resolution = KeywordResolver::new(Arc::new(catalog)).resolve("공통");
        assert_eq!(resolution.chapter.as_deref(), Some("4"));
    }

    #[test]
    fn page_search_reports_pages_and_chapter() {
        let hits = resolver().search_pages("배열의 길이", DEFAULT_PAGE_RESULTS);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pages, vec![4, 5]);
        assert_eq!(hits[0].chapter.as_deref(), Some("5"));
        assert!(resolver().search_pages("", DEFAULT_PAGE_RESULTS).is_empty());
    }

    #[test]
    fn page_search_is_capped() {
        let resolver = resolver();
        assert_eq!(resolver.search_pages("배열의 길이를", DEFAULT_PAGE_RESULTS).len(), 2);
        let capped = resolver.search_pages("배열의 길이를", 1);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].word, "배열");
    }

    #[test]
    fn words_starting_with_jang_are_not_chapters() {
        let resolver = resolver();
        for input in ["2 장점", "3 챕터별 요약"] {
            let resolution = resolver.resolve(input);
            assert!(!resolution.explicit_chapter, "{input}");
        }
        let explicit = resolver.resolve("2장 장점");
        assert!(explicit.explicit_chapter);
        assert_eq!(explicit.chapter.as_deref(), Some("2"));
    }

    #[test]
    fn enhanced_query_wraps_input() {
        assert_eq!(enhance_query(" 배열 "), "Java 배열 프로그래밍 예제 문제");
    }
}
