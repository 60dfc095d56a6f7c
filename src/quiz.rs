use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use regex::Regex;

use crate::catalog::KeywordCatalog;
use crate::error::{TutorError, TutorResult};
use crate::models::{Chapter, Difficulty, GeneratedQuestion, QuestionType, TextChunk};

pub const ANSWER_PLACEHOLDER: &str = "정답을 확인해주세요.";
pub const EXPLANATION_PLACEHOLDER: &str = "해설을 확인해주세요.";
pub const OPTION_COUNT: usize = 4;

const QUESTION_FALLBACK_CHARS: usize = 500;
const CONCEPT_KEYWORD_LIMIT: usize = 5;

static NUMBERED_ITEM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d+\s*[.)]\s+(.+)$").ok());

static OPTION_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^보기\s*(\d+)\s*[:：]\s*(.*)$").ok());

static ANSWER_LEAK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[\s*정답[^\]]*\]").ok());

pub trait LanguageModel: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

impl<T: LanguageModel> LanguageModel for &T {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).complete(prompt)
    }
}

pub fn option_placeholders() -> Vec<String> {
    (1..=OPTION_COUNT).map(|n| format!("선택지{n}")).collect()
}

#[derive(Debug, Clone, Default)]
pub struct QuestionRequest {
    pub query: String,
    pub difficulty: Difficulty,
    pub question_type: QuestionType,
    pub chapter: Option<Chapter>,
}

#[derive(Clone)]
pub struct QuestionSynthesizer<L> {
    llm: L,
    catalog: Arc<KeywordCatalog>,
}

impl<L: LanguageModel> QuestionSynthesizer<L> {
    pub fn new(llm: L, catalog: Arc<KeywordCatalog>) -> Self {
        Self { llm, catalog }
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }

    pub async fn generate(
        &self,
        request: &QuestionRequest,
        context_chunks: &[TextChunk],
    ) -> TutorResult<GeneratedQuestion> {
        if context_chunks.is_empty() {
            return Err(TutorError::InsufficientContext {
                query: request.query.clone(),
            });
        }

        let context = context_chunks
            .iter()
            .map(|chunk| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = build_prompt(
            &request.query,
            request.difficulty,
            request.question_type,
            &context,
        );

        let response = self.llm.complete(&prompt).await.map_err(TutorError::Llm)?;
        let parsed = parse_response(&response, request.question_type);

        if !parsed.missing.is_empty() {
            tracing::warn!(
                error = %TutorError::ParseDegraded { missing: parsed.missing.clone() },
                "question generated with placeholder fields"
            );
        }

        let question = GeneratedQuestion {
            question: parsed.question,
            options: parsed.options,
            correct_answer: parsed.correct_answer,
            explanation: parsed.explanation,
            chapter: request.chapter.clone(),
            concept_keywords: self
                .catalog
                .related_words(&request.query, CONCEPT_KEYWORD_LIMIT),
            difficulty: request.difficulty,
            question_type: request.question_type,
            degraded_fields: parsed.missing.iter().map(|f| f.to_string()).collect(),
        };

        tracing::info!(
            chapter = question.chapter.as_ref().map(|c| c.id.as_str()).unwrap_or("-"),
            options = question.options.len(),
            degraded = question.is_degraded(),
            "question generated"
        );
        Ok(question)
    }
}

pub fn build_prompt(
    query: &str,
    difficulty: Difficulty,
    question_type: QuestionType,
    context: &str,
) -> String {
    let difficulty = difficulty.label();
    let kind = question_type.label();
    let format = match question_type {
        QuestionType::MultipleChoice => {
            "문제: [문제 내용]\n보기1: [선택지]\n보기2: [선택지]\n보기3: [선택지]\n보기4: [선택지]\n정답: [정답 보기 번호]\n해설: [해설]"
        }
        QuestionType::ShortAnswer => "문제: [문제 내용]\n정답: [정답]\n해설: [해설]",
    };

    format!(
        "다음 Java 교재 내용을 바탕으로 '{query}'에 관한 {difficulty} 난이도의 {kind} 문제를 1개 생성해주세요.\n\n\
         **컨텍스트:**\n{context}\n\n\
         **요구사항:**\n\
         1. 난이도: {difficulty}\n\
         2. 문제 유형: {kind}\n\
         3. Java 프로그래밍 관련 문제\n\
         4. 명확하고 이해하기 쉬운 문제\n\
         5. 정답과 해설을 함께 작성\n\n\
         **출력 형식:**\n{format}\n\n\
         각 항목은 위 라벨로 시작하는 줄에 작성해주세요."
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    None,
    Question,
    Option(u32),
    OptionList,
    Answer,
    Explanation,
}

enum Line<'a> {
    Label(Section, &'a str),
    Text(&'a str),
}

fn classify_line(line: &str) -> Line<'_> {
    let bare = line.trim_start_matches(['*', '#', ' ']);
    for (label, section) in [
        ("문제", Section::Question),
        ("정답", Section::Answer),
        ("해설", Section::Explanation),
        ("보기", Section::OptionList),
        ("선택지", Section::OptionList),
    ] {
        if let Some(rest) = bare.strip_prefix(label) {
            if let Some(rest) = rest.strip_prefix([':', '：']) {
                return Line::Label(section, clean_label_rest(rest));
            }
        }
    }

    if let Some(caps) = OPTION_LABEL.as_ref().and_then(|regex| regex.captures(bare)) {
        let index = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        return Line::Label(Section::Option(index), clean_label_rest(rest));
    }

    Line::Text(line)
}

fn clean_label_rest(rest: &str) -> &str {
    rest.trim_start_matches('*').trim()
}

fn numbered_item(line: &str) -> Option<&str> {
    NUMBERED_ITEM
        .as_ref()
        .and_then(|regex| regex.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

fn append(target: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

pub fn parse_response(content: &str, question_type: QuestionType) -> ParsedQuestion {
    let mut question = String::new();
    let mut answer = String::new();
    let mut explanation = String::new();
    let mut labelled: BTreeMap<u32, String> = BTreeMap::new();
    let mut numbered: Vec<String> = Vec::new();
    let mut held_back: Vec<String> = Vec::new();
    let mut section = Section::None;

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        match classify_line(line) {
            Line::Label(next, rest) => {
                section = next;
                match section {
                    Section::Question => question = rest.to_string(),
                    Section::Answer => answer = rest.to_string(),
                    Section::Explanation => explanation = rest.to_string(),
                    Section::Option(index) => {
                        labelled.insert(index, rest.to_string());
                    }
                    Section::OptionList => {
                        if let Some(item) = numbered_item(rest) {
                            numbered.push(item.to_string());
                        }
                    }
                    Section::None => {}
                }
            }
            Line::Text(text) => match section {
                Section::None => {
                    if let Some(item) = numbered_item(text) {
                        numbered.push(item.to_string());
                    }
                }
                Section::Question => match numbered_item(text) {
                    Some(item) => {
                        numbered.push(item.to_string());
                        held_back.push(text.to_string());
                    }
                    None => append(&mut question, text),
                },
                Section::Option(index) => {
                    if let Some(option) = labelled.get_mut(&index) {
                        append(option, text);
                    }
                }
                Section::OptionList => match numbered_item(text) {
                    Some(item) => numbered.push(item.to_string()),
                    None => {
                        if let Some(last) = numbered.last_mut() {
                            append(last, text);
                        }
                    }
                },
                Section::Answer => append(&mut answer, text),
                Section::Explanation => append(&mut explanation, text),
            },
        }
    }

    let mut missing = Vec::new();

    let options = match question_type {
        QuestionType::ShortAnswer => {
            for line in &held_back {
                append(&mut question, line);
            }
            vec![]
        }
        QuestionType::MultipleChoice => {
            let labelled: Vec<String> = labelled
                .into_values()
                .filter(|option| !option.is_empty())
                .collect();
            let uses_numbered = labelled.len() != OPTION_COUNT && numbered.len() >= OPTION_COUNT;
            if !uses_numbered {
                for line in &held_back {
                    append(&mut question, line);
                }
            }

            if labelled.len() == OPTION_COUNT {
                labelled
            } else if uses_numbered {
                numbered.truncate(OPTION_COUNT);
                numbered
            } else if labelled.len() > OPTION_COUNT {
                labelled.into_iter().take(OPTION_COUNT).collect()
            } else {
                missing.push("options");
                option_placeholders()
            }
        }
    };

    if question.is_empty() {
        missing.push("question");
        let trimmed = content.trim();
        question = if trimmed.chars().count() > QUESTION_FALLBACK_CHARS {
            let head: String = trimmed.chars().take(QUESTION_FALLBACK_CHARS).collect();
            format!("{head}...")
        } else {
            trimmed.to_string()
        };
    }
    if answer.is_empty() {
        missing.push("correct_answer");
        answer = ANSWER_PLACEHOLDER.to_string();
    }
    if explanation.is_empty() {
        missing.push("explanation");
        explanation = EXPLANATION_PLACEHOLDER.to_string();
    }

    ParsedQuestion {
        question,
        options,
        correct_answer: answer,
        explanation,
        missing,
    }
}

pub const DEGRADED_QUESTION_NOTICE: &str =
    "⚠️ 문제 형식을 완전히 해석하지 못했습니다. 모델 응답을 그대로 보여드립니다.";
pub const DEGRADED_OPTIONS_NOTICE: &str =
    "⚠️ 보기를 생성하지 못했습니다. 답을 직접 입력하거나 새 문제를 생성해주세요.";
pub const DEGRADED_ANSWER_NOTICE: &str =
    "⚠️ 이 문제는 정답 정보가 없어 채점할 수 없습니다. 새 문제를 생성해주세요.";

impl GeneratedQuestion {
    pub fn render_for_learner(&self) -> String {
        let question = match ANSWER_LEAK.as_ref() {
            Some(regex) => regex.replace_all(&self.question, "").trim().to_string(),
            None => self.question.trim().to_string(),
        };

        let mut out = String::new();
        if self.has_degraded("question") {
            out.push_str(DEGRADED_QUESTION_NOTICE);
            out.push_str("\n\n");
        }
        out.push_str(&question);

        if self.has_degraded("options") {
            out.push_str("\n\n");
            out.push_str(DEGRADED_OPTIONS_NOTICE);
        } else if !self.options.is_empty() {
            out.push_str("\n\n");
            for (idx, option) in self.options.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", idx + 1, option));
            }
        }

        if self.has_degraded("correct_answer") {
            out = out.trim_end().to_string();
            out.push_str("\n\n");
            out.push_str(DEGRADED_ANSWER_NOTICE);
        }
        out.trim_end().to_string()
    }
}
