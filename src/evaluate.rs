use std::sync::LazyLock;

use regex::Regex;

use crate::models::{EvaluationResult, GeneratedQuestion};

pub const NO_PENDING_QUESTION: &str =
    "죄송합니다. 문제의 정답 정보를 찾을 수 없습니다. 다시 문제를 생성해주세요.";

static FIRST_NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[0-9]+").ok());

pub fn evaluate(user_answer: &str, correct_answer: &str) -> EvaluationResult {
    let is_correct = is_correct(user_answer, correct_answer);
    EvaluationResult {
        is_correct,
        message: if is_correct {
            "정답입니다!".to_string()
        } else {
            format!("오답입니다. 정답: {}", correct_answer.trim())
        },
    }
}

pub const UNGRADABLE_QUESTION: &str =
    "이 문제는 정답 정보를 해석하지 못해 채점할 수 없습니다. 새 문제를 생성해주세요.";

pub fn evaluate_question(user_answer: &str, question: &GeneratedQuestion) -> EvaluationResult {
    if question.has_degraded("correct_answer") {
        return EvaluationResult {
            is_correct: false,
            message: UNGRADABLE_QUESTION.to_string(),
        };
    }

    let is_correct = is_correct(user_answer, &question.correct_answer);
    let explanation = if question.has_degraded("explanation") {
        ""
    } else {
        question.explanation.trim()
    };

    let message = if is_correct {
        let mut message = "✅ **정답입니다!** 잘 하셨네요!\n\n".to_string();
        if explanation.is_empty() {
            message.push_str("이 개념을 잘 이해하고 계시는군요.");
        } else {
            message.push_str(&format!("**해설:**\n{explanation}"));
        }
        message
    } else {
        let mut message = format!(
            "❌ **오답입니다.**\n\n**정답:** {}\n\n",
            question.correct_answer.trim()
        );
        if !explanation.is_empty() {
            message.push_str(&format!("**해설:**\n{explanation}\n\n"));
        }
        message.push_str("다시 한번 개념을 복습해보세요.");
        message
    };

    EvaluationResult {
        is_correct,
        message,
    }
}

pub fn is_correct(user_answer: &str, correct_answer: &str) -> bool {
    let user = normalize(user_answer);
    let correct = normalize(correct_answer);
    if user == correct {
        return true;
    }

    if let (Some(user_num), Some(correct_num)) = (
        first_number(&circled_to_digits(user_answer)),
        first_number(&circled_to_digits(correct_answer)),
    ) {
        return user_num == correct_num;
    }

    if let Some(ordinal) = circled_ordinal(user_answer) {
        if ordinal.to_string() == correct {
            return true;
        }
    }

    let trimmed = user_answer.trim();
    let mut chars = trimmed.chars();
    if let (Some(letter), None) = (chars.next(), chars.next()) {
        let letter = letter.to_ascii_lowercase();
        if ('a'..='e').contains(&letter) {
            let ordinal = (letter as u8 - b'a' + 1).to_string();
            return ordinal == normalize(&circled_to_digits(correct_answer));
        }
    }

    false
}

fn normalize(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn first_number(text: &str) -> Option<&str> {
    FIRST_NUMBER
        .as_ref()
        .and_then(|regex| regex.find(text))
        .map(|m| m.as_str().trim_start_matches('0'))
        .map(|digits| if digits.is_empty() { "0" } else { digits })
}

fn glyph_ordinal(c: char) -> Option<u32> {
    match c {
        '\u{2460}'..='\u{2473}' => Some(c as u32 - 0x2460 + 1),
        '\u{24D0}'..='\u{24E9}' => Some(c as u32 - 0x24D0 + 1),
        '\u{24B6}'..='\u{24CF}' => Some(c as u32 - 0x24B6 + 1),
        _ => None,
    }
}

fn circled_ordinal(answer: &str) -> Option<u32> {
    answer.chars().find_map(glyph_ordinal)
}

fn circled_to_digits(answer: &str) -> String {
    let mut out = String::with_capacity(answer.len());
    for c in answer.chars() {
        match glyph_ordinal(c) {
            Some(ordinal) => out.push_str(&ordinal.to_string()),
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, QuestionType};

    #[test]
    fn normalised_equality() {
        assert!(is_correct("  System.out.println ", "system.out.println"));
        assert!(is_correct("정적  변수", "정적 변수"));
        assert!(!is_correct("인스턴스 변수", "클래스 변수"));
    }

    #[test]
    fn numeric_forms_match() {
        assert!(evaluate("3", "③").is_correct);
        assert!(evaluate("3번", "3").is_correct);
        assert!(evaluate("③", "3").is_correct);
        assert!(evaluate("03", "3").is_correct);
        assert!(!evaluate("2", "③").is_correct);
    }

    #[test]
    fn letters_map_to_ordinals() {
        assert!(evaluate("B", "2").is_correct);
        assert!(evaluate("b", "②").is_correct);
        assert!(evaluate("ⓓ", "4").is_correct);
        assert!(!evaluate("f", "6").is_correct);
        assert!(!evaluate("A", "2").is_correct);
    }

    #[test]
    fn unrelated_text_is_incorrect() {
        assert!(!evaluate("정답", "3").is_correct);
        assert!(!evaluate("", "1").is_correct);
    }

    fn question(explanation: &str, degraded: &[&str]) -> GeneratedQuestion {
        GeneratedQuestion {
            question: "q".to_string(),
            options: vec![],
            correct_answer: "2".to_string(),
            explanation: explanation.to_string(),
            chapter: None,
            concept_keywords: vec![],
            difficulty: Difficulty::Normal,
            question_type: QuestionType::MultipleChoice,
            degraded_fields: degraded.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn feedback_includes_answer_and_explanation() {
        let wrong = evaluate_question("1", &question("length 속성을 쓴다.", &[]));
        assert!(!wrong.is_correct);
        assert!(wrong.message.contains("**정답:** 2"));
        assert!(wrong.message.contains("length 속성을 쓴다."));
        assert!(wrong.message.ends_with("다시 한번 개념을 복습해보세요."));

        let right = evaluate_question("②", &question("length 속성을 쓴다.", &[]));
        assert!(right.is_correct);
        assert!(right.message.starts_with("✅ **정답입니다!**"));
    }

    #[test]
    fn missing_answer_is_not_graded() {
        let mut degraded = question("0부터 시작한다.", &["correct_answer"]);
        degraded.correct_answer = "정답을 확인해주세요.".to_string();
        let result = evaluate_question("0", &degraded);
        assert!(!result.is_correct);
        assert_eq!(result.message, UNGRADABLE_QUESTION);
        assert!(!result.message.contains("정답을 확인해주세요."));
    }

    #[test]
    fn placeholder_explanation_is_not_shown() {
        let result = evaluate_question("2", &question("해설을 확인해주세요.", &["explanation"]));
        assert!(result.is_correct);
        assert!(!result.message.contains("해설을 확인해주세요."));
    }
}
