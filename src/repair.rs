use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone, Copy)]
pub struct RepairRule {
    pub name: &'static str,
    pub pattern: &'static str,
    pub replacement: &'static str,
}

impl RepairRule {
    const fn new(name: &'static str, pattern: &'static str, replacement: &'static str) -> Self {
        Self {
            name,
            pattern,
            replacement,
        }
    }

    fn compile(&self, dot_all: bool) -> Option<Regex> {
        match RegexBuilder::new(self.pattern)
            .case_insensitive(true)
            .dot_matches_new_line(dot_all)
            .build()
        {
            Ok(regex) => Some(regex),
            Err(err) => {
                tracing::warn!(rule = self.name, "skipping repair rule: {err}");
                None
            }
        }
    }
}

pub const REPAIR_RULES: &[RepairRule] = &[
    RepairRule::new(
        "example_file",
        r"예제\s*(\d+)\s*-\s*(\d+)\s*/\s*(\w+?)\s*\.\s*(?-i:j)(?:ava)?\b",
        "예제 ${1}-${2}/${3}.java",
    ),
    RepairRule::new(
        "file_name",
        r"\b((?-i:[A-Z])[A-Za-z0-9_]*)\s*\.\s*(?-i:j)(?:ava)?\b",
        "${1}.java",
    ),
    RepairRule::new(
        "package_name",
        r"\bj(?:ava)?\s*\.\s*(util|io|awt|lang)\b",
        "java.${1}",
    ),
    RepairRule::new("api_term", r"\bjava\s+a\s*p\s*i\b", "Java API"),
    RepairRule::new(
        "print_call",
        r"system\s*\.\s*o[u\s]*t\s*\.\s*print(ln)?",
        "System.out.print${1}",
    ),
    RepairRule::new("float_keyword", r"\bf+l+[oa]+t+\b", "float"),
    RepairRule::new("int_keyword", r"\bi+n+t+\b", "int"),
    RepairRule::new("double_keyword", r"\bd+o*u+b+l+e+\b", "double"),
    RepairRule::new("char_keyword", r"\bc+h+a+r+\b", "char"),
    RepairRule::new("boolean_keyword", r"\bb+o*l+[ea]*n+\b", "boolean"),
];

pub const BOILERPLATE_RULES: &[RepairRule] = &[
    RepairRule::new(
        "watermark_block",
        r"\[?\s*e\s*-?\s*book[^\n]*?샘플.*?무료.*?공유\s*\]?.*?seong\s*\.\s*namkung\s*@\s*gmail\s*\.\s*com",
        "",
    ),
    RepairRule::new(
        "watermark_line",
        r"\[\s*e\s*-?\s*book[^\]\n]*샘플[^\]\n]*\]",
        "",
    ),
    RepairRule::new(
        "contact_email",
        r"seong\s*\.\s*namkung\s*@\s*gmail\s*\.\s*com",
        "",
    ),
    RepairRule::new("release_date", r"2025\.\s*7\.\s*7\s*출시", ""),
    RepairRule::new("edition_banner", r"올컬러[^\n]*?2025", ""),
];

const MAX_PASSES: usize = 4;

static COMPILED_REPAIR: LazyLock<Vec<(RepairRule, Regex)>> =
    LazyLock::new(|| compile_rules(REPAIR_RULES, false));

static COMPILED_BOILERPLATE: LazyLock<Vec<(RepairRule, Regex)>> =
    LazyLock::new(|| compile_rules(BOILERPLATE_RULES, true));

fn compile_rules(rules: &[RepairRule], dot_all: bool) -> Vec<(RepairRule, Regex)> {
    rules
        .iter()
        .filter_map(|rule| rule.compile(dot_all).map(|regex| (*rule, regex)))
        .collect()
}

pub fn repair(raw_text: &str) -> String {
    fold_to_fixed_point(raw_text, &COMPILED_REPAIR)
}

pub fn strip_boilerplate(text: &str) -> String {
    fold_to_fixed_point(text, &COMPILED_BOILERPLATE)
}

pub fn apply_rule(rule: &RepairRule, text: &str) -> String {
    match rule.compile(false) {
        Some(regex) => regex.replace_all(text, rule.replacement).into_owned(),
        None => text.to_string(),
    }
}

fn fold_to_fixed_point(text: &str, rules: &[(RepairRule, Regex)]) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_PASSES {
        let next = rules.iter().fold(current.clone(), |acc, (rule, regex)| {
            regex.replace_all(&acc, rule.replacement).into_owned()
        });
        if next == current {
            break;
        }
        current = next;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> &'static RepairRule {
        REPAIR_RULES
            .iter()
            .find(|rule| rule.name == name)
            .expect("rule exists")
    }

    #[test]
    fn all_rules_compile() {
        assert_eq!(COMPILED_REPAIR.len(), REPAIR_RULES.len());
        assert_eq!(COMPILED_BOILERPLATE.len(), BOILERPLATE_RULES.len());
    }

    #[test]
    fn restores_example_file_tokens() {
        assert_eq!(repair("예제 2-1/VarEx.j"), "예제 2-1/VarEx.java");
        assert_eq!(repair("예제 2 - 1 / VarEx . j 참고"), "예제 2-1/VarEx.java 참고");
    }

    #[test]
    fn restores_file_names_and_packages() {
        assert_eq!(apply_rule(rule("file_name"), "Foo . j"), "Foo.java");
        assert_eq!(repair("import j . util.Scanner;"), "import java.util.Scanner;");
        assert_eq!(repair("java . io 패키지"), "java.io 패키지");
    }

    #[test]
    fn restores_api_term_and_print_calls() {
        assert_eq!(repair("Java A P I 문서"), "Java API 문서");
        assert_eq!(
            repair("System . o u t . println(x);"),
            "System.out.println(x);"
        );
        assert_eq!(repair("System.ou t.print(y);"), "System.out.print(y);");
    }

    #[test]
    fn restores_primitive_keywords() {
        assert_eq!(repair("iint x = 1;"), "int x = 1;");
        assert_eq!(repair("doouble d;"), "double d;");
        assert_eq!(repair("flaot f;"), "float f;");
        assert_eq!(repair("chhar c;"), "char c;");
        assert_eq!(repair("boolan b;"), "boolean b;");
        assert_eq!(repair("INT n;"), "int n;");
    }

    #[test]
    fn leaves_ordinary_words_alone() {
        let text = "it is a short example. 변수를 선언합니다.";
        assert_eq!(repair(text), text);
    }

    #[test]
    fn strips_watermark_and_email() {
        let text = "본문 시작\n[ebook 샘플 - 무료 공유 금지] 문의 seong.namkung@gmail.com\n본문 끝";
        let stripped = strip_boilerplate(text);
        assert!(!stripped.contains("seong"));
        assert!(!stripped.contains("샘플"));
        assert!(stripped.contains("본문 시작"));
        assert!(stripped.contains("본문 끝"));
    }

    #[test]
    fn strips_partially_corrupted_watermark() {
        let text = "[e-book 샘플입니다] 변수 seong . namkung @ gmail . com 2025. 7. 7 출시";
        let stripped = strip_boilerplate(text);
        assert!(!stripped.contains("namkung"));
        assert!(!stripped.contains("출시"));
        assert!(stripped.contains("변수"));
    }

    #[test]
    fn both_passes_are_idempotent() {
        let samples = [
            "예제 2-1/VarEx.j 와 Foo . j",
            "System . out . println(\"hi\"); iint a; boolan b;",
            "j . util 그리고 Java A P I",
            "[ebook 샘플 무료 공유] x seong.namkung@gmail.com 올컬러 개정판 2025",
            "올컬러 A 2025. 7. 7 출시 B 2025",
            "",
        ];
        for sample in samples {
            let once = repair(sample);
            assert_eq!(repair(&once), once, "repair not idempotent for {sample:?}");
            let stripped = strip_boilerplate(sample);
            assert_eq!(
                strip_boilerplate(&stripped),
                stripped,
                "strip not idempotent for {sample:?}"
            );
        }
    }
}
