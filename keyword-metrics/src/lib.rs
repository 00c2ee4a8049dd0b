pub mod dataforseo;

pub use dataforseo::DataForSeoClient;

use async_trait::async_trait;
use gapscout_core::{CoreError, KeywordMetrics, KeywordMetricsError};

/// Search volume and difficulty data for keywords.
#[async_trait]
pub trait KeywordMetricsProvider: Send + Sync {
    /// Related keywords for `seed`, the seed itself included when known.
    async fn keyword_ideas(&self, seed: &str) -> Result<Vec<KeywordMetrics>, CoreError>;

    /// Metrics for exactly `keyword`, matched case-insensitively.
    async fn keyword_metrics(&self, keyword: &str) -> Result<KeywordMetrics, CoreError> {
        let ideas = self.keyword_ideas(keyword).await?;
        find_exact(ideas, keyword)
    }

    /// One lookup per keyword; a failed lookup does not affect the others.
    async fn batch_keyword_metrics(
        &self,
        keywords: &[String],
    ) -> Vec<Result<KeywordMetrics, CoreError>> {
        let mut results = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            results.push(self.keyword_metrics(keyword).await);
        }
        results
    }
}

pub fn find_exact(ideas: Vec<KeywordMetrics>, keyword: &str) -> Result<KeywordMetrics, CoreError> {
    let wanted = keyword.trim().to_lowercase();
    ideas
        .into_iter()
        .find(|idea| idea.keyword.to_lowercase() == wanted)
        .ok_or_else(|| {
            CoreError::KeywordMetrics(KeywordMetricsError::NotFound {
                keyword: keyword.to_string(),
            })
        })
}
