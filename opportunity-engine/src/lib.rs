pub mod aeo;
pub mod batch;
pub mod builder;
pub mod gap_miner;
pub mod scoring;
pub mod signals;

pub use aeo::{placeholder_hints, AEO_SYSTEM_PROMPT};
pub use batch::{BatchOptions, BatchReport, CancelFlag, SkippedKeyword};
pub use builder::BuildOptions;
pub use gap_miner::{GapMiningResult, MiningOptions, QuestionTally, ThreadAnalysis};
pub use scoring::{compute_gap_weight, normalize_difficulty, opportunity_score};
pub use signals::{confusion_count, dissatisfaction_count, extract_questions};

use gapscout_core::{CallSettings, EngineSettings, RetryExecutor};
use keyword_metrics::KeywordMetricsProvider;
use llm_interface::LlmProvider;
use reddit_client::DiscussionSource;
use std::sync::Arc;

/// Scores keywords against community demand mined from discussion threads.
///
/// Collaborators are passed in explicitly so tests can substitute fakes. The
/// LLM and keyword metrics providers are optional: without an LLM, answer
/// hints fall back to a template, and without metrics only callers that
/// supply volume and difficulty themselves can build opportunities.
pub struct OpportunityEngine {
    discussions: Arc<dyn DiscussionSource>,
    llm: Option<Arc<dyn LlmProvider>>,
    metrics: Option<Arc<dyn KeywordMetricsProvider>>,
    settings: EngineSettings,
}

impl OpportunityEngine {
    pub fn new(discussions: Arc<dyn DiscussionSource>, settings: EngineSettings) -> Self {
        Self {
            discussions,
            llm: None,
            metrics: None,
            settings,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_keyword_metrics(mut self, metrics: Arc<dyn KeywordMetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    fn executor(call: &CallSettings) -> RetryExecutor {
        RetryExecutor::new(call.policy())
    }
}
