use crate::builder::{BuildOptions, Provenance};
use crate::OpportunityEngine;
use futures::future;
use futures::stream::{self, StreamExt};
use gapscout_core::{ConfigError, ContentOpportunity, CoreError, EngineSettings, KeywordInput};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared stop signal for a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub top_n: usize,
    pub min_score: f64,
    pub subreddits: Vec<String>,
    /// Per-keyword thread budget, lower than a single build's.
    pub max_threads: u32,
    pub include_aeo: bool,
    /// Keywords built at the same time.
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            top_n: 10,
            min_score: 0.0,
            subreddits: vec!["all".to_string()],
            max_threads: 15,
            include_aeo: true,
            concurrency: 1,
        }
    }
}

impl BatchOptions {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            subreddits: settings.subreddits.clone(),
            max_threads: settings.batch_max_threads,
            concurrency: settings.keyword_concurrency,
            ..Self::default()
        }
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            subreddits: self.subreddits.clone(),
            max_threads: self.max_threads,
            include_aeo: self.include_aeo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedKeyword {
    pub keyword: String,
    pub error_code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Filtered by minimum score, best first, at most `top_n`.
    pub opportunities: Vec<ContentOpportunity>,
    pub skipped: Vec<SkippedKeyword>,
    /// Set when cancellation left some keywords unstarted.
    pub cancelled: bool,
}

/// Most specific code available, e.g. `REDDIT_FORBIDDEN` rather than `REDDIT_API`.
pub fn detailed_error_code(error: &CoreError) -> String {
    error.detailed_code().to_string()
}

/// Keeps opportunities scoring at least `min_score`, best first, at most `top_n`.
/// Equal scores keep their input order.
pub fn rank(
    opportunities: Vec<ContentOpportunity>,
    min_score: f64,
    top_n: usize,
) -> Vec<ContentOpportunity> {
    let mut ranked: Vec<ContentOpportunity> = opportunities
        .into_iter()
        .filter(|opportunity| opportunity.opportunity_score >= min_score)
        .collect();
    ranked.sort_by(|a, b| {
        b.opportunity_score
            .partial_cmp(&a.opportunity_score)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(top_n);
    ranked
}

struct BatchJob {
    input: KeywordInput,
    provenance: Provenance,
}

impl OpportunityEngine {
    /// Builds every keyword and ranks the results.
    ///
    /// A keyword that fails is reported in `skipped` and never aborts the
    /// batch. Once `cancel` is raised no further keyword is started, and the
    /// opportunities completed so far are still ranked and returned.
    pub async fn find_best_opportunities(
        &self,
        keywords: &[KeywordInput],
        options: &BatchOptions,
        cancel: &CancelFlag,
    ) -> BatchReport {
        let jobs = keywords
            .iter()
            .map(|input| BatchJob {
                input: input.clone(),
                provenance: Provenance::default(),
            })
            .collect();
        self.run_batch(jobs, options, cancel).await
    }

    /// Expands `seed` into keyword ideas and ranks them.
    pub async fn discover_opportunities(
        &self,
        seed: &str,
        options: &BatchOptions,
        cancel: &CancelFlag,
    ) -> Result<BatchReport, CoreError> {
        let provider = self.metrics.as_ref().ok_or_else(|| {
            CoreError::Config(ConfigError::MissingEnvironmentVariable {
                var_name: "DATAFORSEO_API_KEY".to_string(),
            })
        })?;

        let ideas = Self::executor(&self.settings.metrics)
            .execute("keyword ideas", || provider.keyword_ideas(seed))
            .await?;
        info!(seed = %seed, ideas = ideas.len(), "Discovered keyword ideas");

        let jobs = ideas
            .iter()
            .map(|metrics| BatchJob {
                input: KeywordInput::from(metrics),
                provenance: Provenance::from(metrics),
            })
            .collect();
        Ok(self.run_batch(jobs, options, cancel).await)
    }

    async fn run_batch(
        &self,
        jobs: Vec<BatchJob>,
        options: &BatchOptions,
        cancel: &CancelFlag,
    ) -> BatchReport {
        let build = options.build_options();
        let total = jobs.len();

        // `buffered` keeps input order, which the stable sort in `rank` relies on.
        let outcomes: Vec<(String, Result<ContentOpportunity, CoreError>)> = stream::iter(jobs)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|job| {
                let build = &build;
                async move {
                    let result = self
                        .build_with_provenance(&job.input, job.provenance, build)
                        .await;
                    (job.input.keyword, result)
                }
            })
            .buffered(options.concurrency.max(1))
            .collect()
            .await;

        let started = outcomes.len();
        let mut completed = Vec::with_capacity(started);
        let mut skipped = Vec::new();
        for (keyword, result) in outcomes {
            match result {
                Ok(opportunity) => completed.push(opportunity),
                Err(e) => {
                    let error_code = detailed_error_code(&e);
                    warn!(keyword = %keyword, code = %error_code, "Skipping keyword: {}", e);
                    skipped.push(SkippedKeyword {
                        keyword,
                        error_code,
                        message: e.to_string(),
                    });
                }
            }
        }

        let cancelled = started < total;
        if cancelled {
            warn!(started, total, "Batch cancelled before all keywords were started");
        }

        let opportunities = rank(completed, options.min_score, options.top_n);
        info!(
            ranked = opportunities.len(),
            skipped = skipped.len(),
            "Batch finished"
        );
        BatchReport {
            opportunities,
            skipped,
            cancelled,
        }
    }
}
