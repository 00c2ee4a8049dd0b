use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Community-demand indicators for one keyword over a sample of threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapSignals {
    pub reddit_mentions: u32,
    pub repeated_questions: u32,
    pub confusion_markers: u32,
    pub dissatisfaction_markers: u32,
}

impl GapSignals {
    pub fn new(
        reddit_mentions: u32,
        repeated_questions: u32,
        confusion_markers: u32,
        dissatisfaction_markers: u32,
    ) -> Self {
        Self {
            reddit_mentions,
            repeated_questions,
            confusion_markers,
            dissatisfaction_markers,
        }
    }
}

/// Answer-engine-optimization payload attached to an opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AeoHints {
    pub canonical_answer: String,
    pub key_bullets: Vec<String>,
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunitySources {
    pub reddit_threads: Vec<String>,
    #[serde(rename = "dataForSeoTaskId", skip_serializing_if = "Option::is_none")]
    pub data_for_seo_task_id: Option<String>,
}

/// A scored content opportunity for a single keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentOpportunity {
    pub keyword: String,
    pub volume: u64,
    /// Normalized to `[0, 1]`.
    pub difficulty: f64,
    pub gap: GapSignals,
    pub opportunity_score: f64,
    pub intents: Vec<String>,
    pub top_questions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aeo: Option<AeoHints>,
    pub sources: OpportunitySources,
}

/// One batch entry: a keyword with its provider metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordInput {
    pub keyword: String,
    pub volume: u64,
    /// Provider difficulty on the 0-100 scale.
    pub difficulty: f64,
}

impl KeywordInput {
    pub fn new(keyword: impl Into<String>, volume: u64, difficulty: f64) -> Self {
        Self {
            keyword: keyword.into(),
            volume,
            difficulty,
        }
    }
}

/// Search metrics returned by the keyword data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordMetrics {
    pub keyword: String,
    pub volume: u64,
    /// 0-100 scale as reported by the provider.
    pub difficulty: f64,
    pub cpc: Option<f64>,
    pub competition: Option<f64>,
    pub serp_features: Vec<String>,
    pub task_id: Option<String>,
}

impl From<&KeywordMetrics> for KeywordInput {
    fn from(metrics: &KeywordMetrics) -> Self {
        Self {
            keyword: metrics.keyword.clone(),
            volume: metrics.volume,
            difficulty: metrics.difficulty,
        }
    }
}

/// A discussion thread returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedditThread {
    pub id: String,
    /// Prefixed subreddit name, e.g. `r/smallbusiness`.
    pub scope: String,
    pub title: String,
    pub url: String,
    pub score: i64,
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedditComment {
    pub id: String,
    pub body: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub parent_id: String,
    pub thread_id: String,
}

/// Converts a Reddit `created_utc` value, falling back to the epoch for garbage.
pub fn timestamp_from_utc_seconds(created_utc: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(created_utc as i64, 0)
        .single()
        .unwrap_or_default()
}
