use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

const CODE_INDICATORS: &[&str] = &[
    "class ", "public ", "static ", "void ", "import ", "//", "/*", "{", "}", ";",
];

static NOISE_LINES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\s*[\|\-\+\s]+$",
        r"^\s*[\d\s\.\,\|\-]+\s*$",
        r"^\s*Chapter\s+\d+\s*$",
        r"^\s*[><]?\s*\d+\s*[><]?$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static SYMBOLS_ONLY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\w\s가-힣]+$").ok());

static TABLE_CONTENT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"종\s*류.*?연산자.*?우선순위",
        r"결합규칙.*?연산자",
        r"우선순위.*?높음.*?낮음",
    ]
    .iter()
    .filter_map(|pattern| {
        RegexBuilder::new(pattern)
            .dot_matches_new_line(true)
            .build()
            .ok()
    })
    .collect()
});

static CAPTION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    RegexBuilder::new(r"^\s*\[?\s*(그림|표|figure|table)\s*\d+\s*-\s*\d+")
        .case_insensitive(true)
        .build()
        .ok()
});

static HANGUL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[가-힣]").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Content,
    Table,
    Caption,
    Noise,
}

pub fn classify_block(text: &str) -> BlockKind {
    if text.trim().is_empty() {
        return BlockKind::Noise;
    }

    let lines: Vec<&str> = text.lines().collect();
    if is_table(&lines) {
        return BlockKind::Table;
    }
    if is_caption(text) {
        return BlockKind::Caption;
    }
    if is_valid_content(text) {
        BlockKind::Content
    } else {
        BlockKind::Noise
    }
}

pub fn clean_line(line: &str) -> &str {
    let line = line.trim();
    if line.chars().count() < 2 {
        return "";
    }

    if NOISE_LINES.iter().any(|pattern| pattern.is_match(line)) {
        return "";
    }

    let symbols_only = SYMBOLS_ONLY
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(line));
    if symbols_only && line.chars().count() < 5 {
        return "";
    }

    line
}

pub fn is_code(text: &str) -> bool {
    CODE_INDICATORS
        .iter()
        .any(|indicator| text.contains(indicator))
}

pub fn is_table(lines: &[&str]) -> bool {
    if lines.len() < 2 {
        return false;
    }

    let full_text = lines.join("\n");
    if TABLE_CONTENT
        .iter()
        .any(|pattern| pattern.is_match(&full_text))
    {
        return true;
    }

    let total = lines.len() as f32;
    let short = lines
        .iter()
        .filter(|line| line.trim().chars().count() < 20)
        .count() as f32;
    let numeric = lines
        .iter()
        .filter(|line| line.chars().any(|c| c.is_ascii_digit()))
        .count() as f32;

    short / total > 0.7 && numeric / total > 0.5
}

pub fn is_caption(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.lines().count() <= 2
        && CAPTION
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(trimmed))
}

pub fn is_valid_content(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }

    let has_hangul = HANGUL
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(text));
    if has_hangul || is_code(text) {
        return true;
    }

    text.split(['.', '!', '?'])
        .any(|sentence| sentence.trim().chars().count() > 5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_line_drops_layout_noise() {
        assert_eq!(clean_line("  | - + | "), "");
        assert_eq!(clean_line("12 34, 5.6"), "");
        assert_eq!(clean_line("Chapter 3"), "");
        assert_eq!(clean_line("> 57 <"), "");
        assert_eq!(clean_line("x"), "");
        assert_eq!(clean_line("※★"), "");
        assert_eq!(clean_line("  int x = 10;  "), "int x = 10;");
        assert_eq!(clean_line("변수란 무엇인가"), "변수란 무엇인가");
    }

    #[test]
    fn detects_operator_precedence_table() {
        let lines = ["종 류", "연산자", "우선순위"];
        assert!(is_table(&lines));
    }

    #[test]
    fn detects_short_numeric_tables() {
        let lines = ["byte 1", "short 2", "int 4", "long 8"];
        assert!(is_table(&lines));
        assert!(!is_table(&["int 4"]));
        let prose = [
            "변수는 값을 저장할 수 있는 메모리 공간이다.",
            "변수의 이름은 의미 있게 짓는 것이 좋다.",
        ];
        assert!(!is_table(&prose));
    }

    #[test]
    fn classifies_blocks() {
        assert_eq!(classify_block("그림 2-1 변수의 선언"), BlockKind::Caption);
        assert_eq!(
            classify_block("배열은 같은 타입의 여러 변수를 하나로 묶은 것이다."),
            BlockKind::Content
        );
        assert_eq!(classify_block("int[] arr = new int[5];"), BlockKind::Content);
        assert_eq!(classify_block("a b"), BlockKind::Noise);
        assert_eq!(classify_block("   "), BlockKind::Noise);
    }

    #[test]
    fn english_sentences_are_content() {
        assert!(is_valid_content("The length of an array is fixed"));
        assert!(!is_valid_content("ok. no."));
    }
}
