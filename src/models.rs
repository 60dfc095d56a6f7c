use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub page_range: (u32, u32),
    pub keywords: Vec<String>,
}

impl Chapter {
    pub fn contains_page(&self, page: u32) -> bool {
        self.page_range.0 <= page && page <= self.page_range.1
    }

    pub fn ordinal(&self) -> u32 {
        self.id.trim().parse().unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordEntry {
    pub word: String,
    pub pages: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub text: String,
}

impl TextBlock {
    pub fn new(x: f32, y: f32, text: impl Into<String>) -> Self {
        Self {
            x,
            y,
            width: 0.0,
            height: 0.0,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageBlocks {
    pub page_number: u32,
    pub blocks: Vec<TextBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_number: u32,
    pub content: String,
    pub word_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    pub content: String,
    pub page_number: u32,
    pub word_count: usize,
    pub source_path: String,
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: TextChunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "쉬움",
            Difficulty::Normal => "보통",
            Difficulty::Hard => "어려움",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "easy" | "쉬움" => Some(Difficulty::Easy),
            "normal" | "보통" => Some(Difficulty::Normal),
            "hard" | "어려움" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    MultipleChoice,
    ShortAnswer,
}

impl QuestionType {
    pub fn label(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "객관식",
            QuestionType::ShortAnswer => "주관식",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "multiple_choice" | "mc" | "객관식" => Some(QuestionType::MultipleChoice),
            "short_answer" | "short" | "주관식" => Some(QuestionType::ShortAnswer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub chapter: Option<Chapter>,
    pub concept_keywords: Vec<String>,
    pub difficulty: Difficulty,
    pub question_type: QuestionType,
    #[serde(default)]
    pub degraded_fields: Vec<String>,
}

impl GeneratedQuestion {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_fields.is_empty()
    }

    pub fn has_degraded(&self, field: &str) -> bool {
        self.degraded_fields.iter().any(|f| f == field)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationResult {
    pub is_correct: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageHit {
    pub word: String,
    pub pages: Vec<u32>,
    pub chapter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestManifest {
    pub pdf_hash: String,
    pub created_at: DateTime<Utc>,
    pub chunk_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub pdf_path: String,
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub rebuild: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStatus {
    pub stage: String,
    pub message: Option<String>,
    pub chunk_count: i64,
}
