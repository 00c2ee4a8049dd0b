//! Text heuristics run over every comment body.

use regex::Regex;
use std::sync::LazyLock;

pub const MAX_QUESTIONS_PER_TEXT: usize = 10;

static QUESTION_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(how|what|why|where|when|which|do|does|can|should|is|are|will|would|could)\b",
    )
    .expect("valid question regex")
});

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?\n]").expect("valid sentence regex"));

/// One entry per pattern family; each contributes at most one point per text.
static CONFUSION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)confus(ed|ing)",
        r"(?i)not\s+(sure|clear)",
        r"(?i)anyone\s+know",
        r"(?i)can\s+someone\s+explain",
        r"(?i)don['’]?t\s+understand",
        r"(?i)help\s+me\s+understand",
    ])
});

static DISSATISFACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)didn['’]?t\s+work",
        r"(?i)no\s+answer",
        r"(?i)still\s+stuck",
        r"(?i)tried\s+everything",
        r"(?i)doesn['’]?t\s+help",
        r"(?i)waste\s+of\s+time",
        r"(?i)frustrated",
    ])
});

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid signal regex"))
        .collect()
}

fn families_matched(patterns: &[Regex], text: &str) -> u32 {
    patterns.iter().filter(|pattern| pattern.is_match(text)).count() as u32
}

/// Sentences of `text` that open with an interrogative or modal word.
///
/// Terminal punctuation is dropped, casing is kept, and at most
/// [`MAX_QUESTIONS_PER_TEXT`] are returned in their original order.
pub fn extract_questions(text: &str) -> Vec<String> {
    SENTENCE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty() && QUESTION_START.is_match(fragment))
        .take(MAX_QUESTIONS_PER_TEXT)
        .map(str::to_string)
        .collect()
}

/// Number of distinct confusion pattern families found in `text`.
pub fn confusion_count(text: &str) -> u32 {
    families_matched(&CONFUSION_PATTERNS, text)
}

/// Number of distinct dissatisfaction pattern families found in `text`.
pub fn dissatisfaction_count(text: &str) -> u32 {
    families_matched(&DISSATISFACTION_PATTERNS, text)
}

/// All three extractors applied to one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextSignals {
    pub questions: Vec<String>,
    pub confusion: u32,
    pub dissatisfaction: u32,
}

impl TextSignals {
    pub fn scan(text: &str) -> Self {
        Self {
            questions: extract_questions(text),
            confusion: confusion_count(text),
            dissatisfaction: dissatisfaction_count(text),
        }
    }
}
