//! Answer-engine-optimization hints.

use crate::OpportunityEngine;
use gapscout_core::AeoHints;
use serde::Deserialize;
use tracing::{debug, warn};

pub const MAX_KEY_BULLETS: usize = 4;
const MIN_KEY_BULLETS: usize = 2;

pub const AEO_SYSTEM_PROMPT: &str = "You write short, citable answers for AI answer engines. \
Reply with a single JSON object and nothing else, shaped as \
{\"canonicalAnswer\": string, \"keyBullets\": [string]}. \
The canonical answer is 1-3 sentences that directly answer the searcher. \
Give 2-4 bullets: concrete steps, one compliance or safety caveat where it applies, \
and one measurable check that shows the fix is working.";

/// Template used when no model is configured or its reply is unusable.
pub fn placeholder_hints(keyword: &str) -> AeoHints {
    AeoHints {
        canonical_answer: format!(
            "Direct, actionable answer for \"{}\" based on community pain points. \
             This should be 1-3 sentences that AI engines can extract and cite.",
            keyword
        ),
        key_bullets: vec![
            "1-3 actionable steps that solve the core problem".to_string(),
            "1 compliance/safety note relevant to the industry".to_string(),
            "1 measurable check (\"if X happens, then Y is working\")".to_string(),
        ],
        citations: Vec::new(),
    }
}

pub fn build_prompt(keyword: &str, top_questions: &[String]) -> String {
    let mut prompt = format!("Keyword: {}\n\n", keyword);
    if top_questions.is_empty() {
        prompt.push_str("No recurring community questions were found.\n");
    } else {
        prompt.push_str("Questions people keep asking about it:\n");
        for question in top_questions {
            prompt.push_str("- ");
            prompt.push_str(question);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nWrite the canonical answer and key bullets for this keyword.");
    prompt
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HintsReply {
    #[serde(default)]
    canonical_answer: String,
    #[serde(default)]
    key_bullets: Vec<String>,
}

/// Reads the JSON object out of a model reply, tolerating surrounding prose.
///
/// Returns `None` when the answer is empty or fewer than two bullets survive.
pub fn parse_hints(reply: &str) -> Option<AeoHints> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }

    let parsed: HintsReply = serde_json::from_str(&reply[start..=end]).ok()?;
    let canonical_answer = parsed.canonical_answer.trim().to_string();
    let key_bullets: Vec<String> = parsed
        .key_bullets
        .iter()
        .map(|bullet| bullet.trim())
        .filter(|bullet| !bullet.is_empty())
        .take(MAX_KEY_BULLETS)
        .map(str::to_string)
        .collect();

    if canonical_answer.is_empty() || key_bullets.len() < MIN_KEY_BULLETS {
        return None;
    }

    Some(AeoHints {
        canonical_answer,
        key_bullets,
        citations: Vec::new(),
    })
}

impl OpportunityEngine {
    /// Best effort: any failure degrades to [`placeholder_hints`].
    pub async fn generate_aeo_hints(&self, keyword: &str, top_questions: &[String]) -> AeoHints {
        let Some(llm) = &self.llm else {
            debug!(keyword = %keyword, "No LLM configured, using placeholder hints");
            return placeholder_hints(keyword);
        };

        let prompt = build_prompt(keyword, top_questions);
        let reply = Self::executor(&self.settings.llm)
            .execute("aeo hints", || llm.complete(AEO_SYSTEM_PROMPT, &prompt))
            .await;

        match reply {
            Ok(text) => parse_hints(&text).unwrap_or_else(|| {
                warn!(keyword = %keyword, provider = llm.name(), "Unusable answer hints reply");
                placeholder_hints(keyword)
            }),
            Err(e) => {
                warn!(keyword = %keyword, "Answer hint generation failed: {}", e);
                placeholder_hints(keyword)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_mentions_keyword() {
        let hints = placeholder_hints("roof leak repair");
        assert!(hints.canonical_answer.contains("\"roof leak repair\""));
        assert_eq!(hints.key_bullets.len(), 3);
        assert!(hints.citations.is_empty());
    }

    #[test]
    fn test_prompt_lists_questions() {
        let prompt = build_prompt(
            "gutter cleaning",
            &["How often should I clean gutters".to_string()],
        );
        assert!(prompt.starts_with("Keyword: gutter cleaning"));
        assert!(prompt.contains("- How often should I clean gutters\n"));

        let bare = build_prompt("gutter cleaning", &[]);
        assert!(bare.contains("No recurring community questions"));
    }

    #[test]
    fn test_parse_hints_with_surrounding_prose() {
        let reply = r#"Sure! Here you go:
{"canonicalAnswer": " Clean gutters twice a year. ", "keyBullets": ["Clear debris", " ", "Use a stable ladder", "Check downspouts flow", "Seal joints", "Extra"]}
Hope that helps."#;

        let hints = parse_hints(reply).unwrap();
        assert_eq!(hints.canonical_answer, "Clean gutters twice a year.");
        assert_eq!(
            hints.key_bullets,
            vec!["Clear debris", "Use a stable ladder", "Check downspouts flow", "Seal joints"]
        );
        assert!(hints.citations.is_empty());
    }

    #[test]
    fn test_parse_hints_rejects_thin_replies() {
        assert!(parse_hints("no json here").is_none());
        assert!(parse_hints("} backwards {").is_none());
        assert!(parse_hints(r#"{"canonicalAnswer": "", "keyBullets": ["a", "b"]}"#).is_none());
        assert!(parse_hints(r#"{"canonicalAnswer": "Answer.", "keyBullets": ["only one"]}"#).is_none());
        assert!(parse_hints(r#"{"canonicalAnswer": "Answer.", "keyBullets": ["a", "  "]}"#).is_none());
    }
}
