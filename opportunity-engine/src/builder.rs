use crate::gap_miner::MiningOptions;
use crate::scoring::{normalize_difficulty, opportunity_score};
use crate::OpportunityEngine;
use gapscout_core::{
    ConfigError, ContentOpportunity, CoreError, EngineSettings, KeywordInput, KeywordMetrics,
    OpportunitySources,
};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub subreddits: Vec<String>,
    pub max_threads: u32,
    pub include_aeo: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            subreddits: vec!["all".to_string()],
            max_threads: 25,
            include_aeo: true,
        }
    }
}

impl BuildOptions {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            subreddits: settings.subreddits.clone(),
            max_threads: settings.max_threads,
            include_aeo: true,
        }
    }

    pub fn mining(&self) -> MiningOptions {
        MiningOptions {
            subreddits: self.subreddits.clone(),
            max_threads: self.max_threads,
        }
    }
}

/// Provider-side facts attached to an opportunity for auditability.
#[derive(Debug, Clone, Default)]
pub(crate) struct Provenance {
    pub intents: Vec<String>,
    pub task_id: Option<String>,
}

impl From<&KeywordMetrics> for Provenance {
    fn from(metrics: &KeywordMetrics) -> Self {
        Self {
            intents: intents_from_serp_features(&metrics.serp_features),
            task_id: metrics.task_id.clone(),
        }
    }
}

/// SERP feature names, trimmed and deduplicated in first-seen order.
pub fn intents_from_serp_features(features: &[String]) -> Vec<String> {
    let mut intents: Vec<String> = Vec::new();
    for feature in features.iter().map(|f| f.trim()).filter(|f| !f.is_empty()) {
        if !intents.iter().any(|seen| seen == feature) {
            intents.push(feature.to_string());
        }
    }
    intents
}

impl OpportunityEngine {
    /// Mines, scores and optionally annotates one keyword.
    ///
    /// `difficulty` is on the provider's 0-100 scale. A failed thread search
    /// is returned as an error; everything after it degrades instead.
    pub async fn build_opportunity(
        &self,
        keyword: &str,
        volume: u64,
        difficulty: f64,
        options: &BuildOptions,
    ) -> Result<ContentOpportunity, CoreError> {
        let input = KeywordInput::new(keyword, volume, difficulty);
        self.build_with_provenance(&input, Provenance::default(), options)
            .await
    }

    /// Looks up volume and difficulty first; a failed lookup is returned as an error.
    pub async fn build_opportunity_for_keyword(
        &self,
        keyword: &str,
        options: &BuildOptions,
    ) -> Result<ContentOpportunity, CoreError> {
        let provider = self.metrics.as_ref().ok_or_else(|| {
            CoreError::Config(ConfigError::MissingEnvironmentVariable {
                var_name: "DATAFORSEO_API_KEY".to_string(),
            })
        })?;

        let metrics = Self::executor(&self.settings.metrics)
            .execute("keyword metrics", || provider.keyword_metrics(keyword))
            .await?;
        debug!(
            keyword = %keyword,
            volume = metrics.volume,
            difficulty = metrics.difficulty,
            "Fetched keyword metrics"
        );

        let input = KeywordInput::new(keyword, metrics.volume, metrics.difficulty);
        self.build_with_provenance(&input, Provenance::from(&metrics), options)
            .await
    }

    pub(crate) async fn build_with_provenance(
        &self,
        input: &KeywordInput,
        provenance: Provenance,
        options: &BuildOptions,
    ) -> Result<ContentOpportunity, CoreError> {
        let keyword = input.keyword.trim();
        if keyword.is_empty() {
            return Err(CoreError::InvalidInput {
                message: "keyword must not be empty".to_string(),
            });
        }

        let mined = self.mine_reddit_gaps(keyword, &options.mining()).await?;
        let score = opportunity_score(input.volume, input.difficulty, &mined.gap);

        let aeo = if options.include_aeo {
            Some(self.generate_aeo_hints(keyword, &mined.top_questions).await)
        } else {
            None
        };

        info!(keyword = %keyword, score, "Built content opportunity");
        Ok(ContentOpportunity {
            keyword: keyword.to_string(),
            volume: input.volume,
            difficulty: normalize_difficulty(input.difficulty),
            gap: mined.gap,
            opportunity_score: score,
            intents: provenance.intents,
            top_questions: mined.top_questions,
            aeo,
            sources: OpportunitySources {
                reddit_threads: mined.thread_ids,
                data_for_seo_task_id: provenance.task_id,
            },
        })
    }
}
