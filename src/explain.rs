use serde::{Deserialize, Serialize};

use crate::error::{TutorError, TutorResult};
use crate::models::TextChunk;
use crate::quiz::LanguageModel;

pub const DEFAULT_LEVEL: &str = "초급";
pub const DEGRADED_EXPLANATION_NOTICE: &str =
    "⚠️ 설명 형식을 완전히 해석하지 못했습니다. 일부 항목이 빠져 있을 수 있습니다.";

const EXPLANATION_FALLBACK_CHARS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptExplanation {
    pub concept_name: String,
    pub explanation: String,
    pub examples: Vec<String>,
    pub key_points: Vec<String>,
    pub related_concepts: Vec<String>,
    pub visual_aids: Vec<String>,
    pub chunks_used: usize,
    #[serde(default)]
    pub degraded_fields: Vec<String>,
}

impl ConceptExplanation {
    pub fn render(&self) -> String {
        render_sections(
            &self.concept_name,
            &self.explanation,
            &[
                ("예시", "examples", &self.examples),
                ("핵심 포인트", "key_points", &self.key_points),
                ("관련 개념", "related_concepts", &self.related_concepts),
                ("시각 도구", "visual_aids", &self.visual_aids),
            ],
            &self.degraded_fields,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptReexplanation {
    pub concept_name: String,
    pub reexplanation: String,
    pub simplified_explanation: String,
    pub step_by_step_guide: Vec<String>,
    pub common_misconceptions: Vec<String>,
    pub visual_aids: Vec<String>,
    pub chunks_used: usize,
    #[serde(default)]
    pub degraded_fields: Vec<String>,
}

impl ConceptReexplanation {
    pub fn render(&self) -> String {
        let simplified = if self.simplified_explanation.is_empty() {
            vec![]
        } else {
            vec![self.simplified_explanation.clone()]
        };
        render_sections(
            &self.concept_name,
            &self.reexplanation,
            &[
                ("한 줄 요약", "simplified_explanation", &simplified),
                ("단계별 가이드", "step_by_step_guide", &self.step_by_step_guide),
                ("흔한 오해", "common_misconceptions", &self.common_misconceptions),
                ("시각 도구", "visual_aids", &self.visual_aids),
            ],
            &self.degraded_fields,
        )
    }
}

fn render_sections(
    name: &str,
    body: &str,
    sections: &[(&str, &str, &Vec<String>)],
    degraded: &[String],
) -> String {
    let is_degraded = |field: &str| degraded.iter().any(|f| f == field);

    let mut out = format!("## {name}\n\n");
    if !degraded.is_empty() {
        out.push_str(DEGRADED_EXPLANATION_NOTICE);
        out.push_str("\n\n");
    }
    out.push_str(body);
    out.push('\n');

    for (title, field, items) in sections {
        if items.is_empty() || is_degraded(*field) {
            continue;
        }
        out.push_str(&format!("\n**{title}:**\n"));
        for item in items.iter() {
            out.push_str(&format!("- {item}\n"));
        }
    }
    out.trim_end().to_string()
}

pub struct ConceptExplainer<L> {
    llm: L,
}

impl<L: LanguageModel> ConceptExplainer<L> {
    pub fn new(llm: L) -> Self {
        Self { llm }
    }

    pub async fn explain(
        &self,
        concept: &str,
        level: &str,
        context_chunks: &[TextChunk],
    ) -> TutorResult<ConceptExplanation> {
        let context = join_context(concept, context_chunks)?;
        let prompt = build_prompt(concept, level, &context);
        let response = self.llm.complete(&prompt).await.map_err(TutorError::Llm)?;

        let mut explanation = parse_explanation(&response, concept);
        explanation.chunks_used = context_chunks.len();
        log_degraded(&explanation.degraded_fields);
        tracing::info!(
            concept,
            chunks = explanation.chunks_used,
            "concept explanation generated"
        );
        Ok(explanation)
    }

    pub async fn reexplain(
        &self,
        concept: &str,
        feedback: &str,
        level: &str,
        context_chunks: &[TextChunk],
    ) -> TutorResult<ConceptReexplanation> {
        let context = join_context(concept, context_chunks)?;
        let prompt = build_reexplain_prompt(concept, feedback, level, &context);
        let response = self.llm.complete(&prompt).await.map_err(TutorError::Llm)?;

        let mut reexplanation = parse_reexplanation(&response, concept);
        reexplanation.chunks_used = context_chunks.len();
        log_degraded(&reexplanation.degraded_fields);
        tracing::info!(
            concept,
            chunks = reexplanation.chunks_used,
            "concept re-explanation generated"
        );
        Ok(reexplanation)
    }
}

fn join_context(concept: &str, context_chunks: &[TextChunk]) -> TutorResult<String> {
    if context_chunks.is_empty() {
        return Err(TutorError::InsufficientContext {
            query: concept.to_string(),
        });
    }
    Ok(context_chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

fn log_degraded(missing: &[String]) {
    if missing.is_empty() {
        return;
    }
    tracing::warn!(
        missing = %missing.join(", "),
        "explanation generated with placeholder fields"
    );
}

pub fn build_prompt(concept: &str, level: &str, context: &str) -> String {
    format!(
        "다음 Java 교재 내용을 바탕으로 '{concept}'에 대한 개념을 설명해주세요.\n\n\
         **요청 내용:**\n- 개념: {concept}\n- 사용자 수준: {level}\n\n\
         **교재 내용:**\n{context}\n\n\
         **요구사항:**\n\
         1. {level} 수준에 맞는 설명\n\
         2. 명확하고 이해하기 쉬운 설명\n\
         3. 실제 예시 포함\n\
         4. 핵심 포인트 정리\n\
         5. 관련 개념 연결\n\
         6. 시각적 도구 제안\n\n\
         **출력 형식:**\n\
         개념명: [개념명]\n\
         설명: [상세한 개념 설명]\n\
         예시: [실제 코드 예시]\n\
         핵심포인트: [주요 포인트들]\n\
         관련개념: [관련된 다른 개념들]\n\
         시각도구: [이해를 돕는 시각적 도구들]\n\n\
         위 형식으로 개념을 설명해주세요."
    )
}

pub fn build_reexplain_prompt(concept: &str, feedback: &str, level: &str, context: &str) -> String {
    format!(
        "다음 Java 교재 내용을 바탕으로 '{concept}'에 대한 개념을 재설명해주세요.\n\n\
         **요청 내용:**\n- 원래 개념: {concept}\n- 사용자 피드백: {feedback}\n- 설명 난이도: {level}\n\n\
         **교재 내용:**\n{context}\n\n\
         **요구사항:**\n\
         1. 사용자 피드백을 반영한 {level} 설명\n\
         2. 더 쉽고 이해하기 쉬운 설명\n\
         3. 단계별 가이드 제공\n\
         4. 일반적인 오해 해소\n\
         5. 시각적 도구 제안\n\
         6. 실제 예시 포함\n\n\
         **출력 형식:**\n\
         개념명: [개념명]\n\
         재설명: [사용자 피드백을 반영한 상세한 재설명]\n\
         단순화된설명: [매우 간단한 설명]\n\
         단계별가이드: [단계별 학습 가이드]\n\
         일반적오해: [일반적인 오해들]\n\
         시각도구: [이해를 돕는 시각적 도구들]\n\n\
         위 형식으로 개념을 재설명해주세요."
    )
}

fn collect_sections(content: &str, labels: &[&str]) -> Vec<Vec<String>> {
    let mut sections = vec![Vec::new(); labels.len()];
    let mut current: Option<usize> = None;

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let labelled = labels
            .iter()
            .enumerate()
            .find_map(|(idx, label)| line.strip_prefix(*label).map(|rest| (idx, rest)));
        let text = match labelled {
            Some((idx, rest)) => {
                current = Some(idx);
                rest
            }
            None => line,
        };

        if let Some(idx) = current {
            let text = bullet(text);
            if !text.is_empty() {
                sections[idx].push(text.to_string());
            }
        }
    }
    sections
}

fn bullet(line: &str) -> &str {
    line.strip_prefix(['-', '*']).unwrap_or(line).trim()
}

fn raw_fallback(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() > EXPLANATION_FALLBACK_CHARS {
        let head: String = trimmed.chars().take(EXPLANATION_FALLBACK_CHARS).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}

fn text_or(
    lines: &[String],
    fallback: impl FnOnce() -> String,
    field: &str,
    missing: &mut Vec<String>,
) -> String {
    if lines.is_empty() {
        missing.push(field.to_string());
        fallback()
    } else {
        lines.join(" ")
    }
}

fn items_or(
    lines: Vec<String>,
    placeholder: &str,
    field: &str,
    missing: &mut Vec<String>,
) -> Vec<String> {
    if lines.is_empty() {
        missing.push(field.to_string());
        vec![placeholder.to_string()]
    } else {
        lines
    }
}

fn name_or(lines: &[String], concept: &str) -> String {
    lines
        .first()
        .cloned()
        .unwrap_or_else(|| concept.to_string())
}

pub fn parse_explanation(content: &str, concept: &str) -> ConceptExplanation {
    let labels = ["개념명:", "설명:", "예시:", "핵심포인트:", "관련개념:", "시각도구:"];
    let mut sections = collect_sections(content, &labels).into_iter();
    let mut next = || sections.next().unwrap_or_default();
    let (name, body, examples, key_points, related, visual) =
        (next(), next(), next(), next(), next(), next());

    let mut missing = Vec::new();
    let explanation = text_or(&body, || raw_fallback(content), "explanation", &mut missing);
    let examples = items_or(examples, "예시를 확인해주세요.", "examples", &mut missing);
    let key_points = items_or(key_points, "핵심 포인트를 확인해주세요.", "key_points", &mut missing);
    let related_concepts = items_or(
        related,
        "관련 개념을 확인해주세요.",
        "related_concepts",
        &mut missing,
    );

    ConceptExplanation {
        concept_name: name_or(&name, concept),
        explanation,
        examples,
        key_points,
        related_concepts,
        visual_aids: visual,
        chunks_used: 0,
        degraded_fields: missing,
    }
}

pub fn parse_reexplanation(content: &str, concept: &str) -> ConceptReexplanation {
    let labels = [
        "개념명:",
        "재설명:",
        "단순화된설명:",
        "단계별가이드:",
        "일반적오해:",
        "시각도구:",
    ];
    let mut sections = collect_sections(content, &labels).into_iter();
    let mut next = || sections.next().unwrap_or_default();
    let (name, body, simplified, steps, misconceptions, visual) =
        (next(), next(), next(), next(), next(), next());

    let mut missing = Vec::new();
    let reexplanation = text_or(&body, || raw_fallback(content), "reexplanation", &mut missing);
    let simplified_explanation = text_or(
        &simplified,
        || "간단한 설명을 확인해주세요.".to_string(),
        "simplified_explanation",
        &mut missing,
    );
    let step_by_step_guide = items_or(
        steps,
        "단계별 가이드를 확인해주세요.",
        "step_by_step_guide",
        &mut missing,
    );
    let common_misconceptions = items_or(
        misconceptions,
        "일반적인 오해를 확인해주세요.",
        "common_misconceptions",
        &mut missing,
    );
    let visual_aids = items_or(visual, "시각적 도구를 확인해주세요.", "visual_aids", &mut missing);

    ConceptReexplanation {
        concept_name: name_or(&name, concept),
        reexplanation,
        simplified_explanation,
        step_by_step_guide,
        common_misconceptions,
        visual_aids,
        chunks_used: 0,
        degraded_fields: missing,
    }
}
