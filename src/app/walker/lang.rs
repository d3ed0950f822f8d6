//! Multilingual name resolution
//!
//! Moodle's multi-language filter stores every translation of a name inline:
//! `{mlang en}Syllabus{mlang}{mlang it}Programma{mlang}`. A name resolves to the
//! preferred language when present, otherwise to the first tagged variant, and
//! untagged names pass through unchanged.

use std::sync::OnceLock;

use regex::Regex;

fn mlang_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{mlang (?P<lang>\w+)\}(?P<name>.*?)\{mlang\}")
            .expect("mlang pattern is a valid regex")
    })
}

/// Picks the `preferred` variant of a multilingual name
pub fn resolve_language(raw: &str, preferred: &str) -> String {
    let mut first = None;
    for captures in mlang_pattern().captures_iter(raw) {
        let (Some(lang), Some(name)) = (captures.name("lang"), captures.name("name")) else {
            continue;
        };
        if lang.as_str() == preferred {
            return name.as_str().to_string();
        }
        first.get_or_insert(name.as_str());
    }
    first.unwrap_or(raw).to_string()
}
