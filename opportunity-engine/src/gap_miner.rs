use crate::signals::TextSignals;
use crate::OpportunityEngine;
use futures::stream::{self, StreamExt};
use gapscout_core::{CoreError, EngineSettings, GapSignals, RedditComment, RedditThread};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// A question counts as repeated once it has been asked this many times.
pub const REPEAT_THRESHOLD: u32 = 3;
pub const MAX_TOP_QUESTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct MiningOptions {
    /// `["all"]` searches without a subreddit restriction.
    pub subreddits: Vec<String>,
    pub max_threads: u32,
}

impl Default for MiningOptions {
    fn default() -> Self {
        Self {
            subreddits: vec!["all".to_string()],
            max_threads: 25,
        }
    }
}

impl MiningOptions {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            subreddits: settings.subreddits.clone(),
            max_threads: settings.max_threads,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GapMiningResult {
    pub gap: GapSignals,
    pub top_questions: Vec<String>,
    /// Every thread that was sampled, including ones whose comments failed to load.
    pub thread_ids: Vec<String>,
}

/// Question frequencies in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct QuestionTally {
    index: HashMap<String, usize>,
    entries: Vec<(String, u32)>,
}

impl QuestionTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, question: &str) {
        match self.index.get(question).copied() {
            Some(position) => self.entries[position].1 += 1,
            None => {
                self.index.insert(question.to_string(), self.entries.len());
                self.entries.push((question.to_string(), 1));
            }
        }
    }

    pub fn count(&self, question: &str) -> u32 {
        self.index
            .get(question)
            .map(|&position| self.entries[position].1)
            .unwrap_or(0)
    }

    pub fn distinct(&self) -> usize {
        self.entries.len()
    }

    fn repeated(&self) -> impl Iterator<Item = &(String, u32)> {
        self.entries
            .iter()
            .filter(|(_, count)| *count >= REPEAT_THRESHOLD)
    }

    pub fn repeated_count(&self) -> u32 {
        self.repeated().count() as u32
    }

    /// Repeated questions by descending frequency, ties in first-seen order.
    pub fn top_questions(&self, limit: usize) -> Vec<String> {
        let mut repeated: Vec<&(String, u32)> = self.repeated().collect();
        repeated.sort_by(|a, b| b.1.cmp(&a.1));
        repeated
            .into_iter()
            .take(limit)
            .map(|(question, _)| question.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
struct GapAccumulator {
    tally: QuestionTally,
    confusion: u32,
    dissatisfaction: u32,
}

impl GapAccumulator {
    fn absorb(&mut self, comments: &[RedditComment]) {
        for comment in comments {
            let signals = TextSignals::scan(&comment.body);
            for question in &signals.questions {
                self.tally.record(question);
            }
            self.confusion += signals.confusion;
            self.dissatisfaction += signals.dissatisfaction;
        }
    }

    fn finish(self, reddit_mentions: u32, thread_ids: Vec<String>) -> GapMiningResult {
        GapMiningResult {
            gap: GapSignals::new(
                reddit_mentions,
                self.tally.repeated_count(),
                self.confusion,
                self.dissatisfaction,
            ),
            top_questions: self.tally.top_questions(MAX_TOP_QUESTIONS),
            thread_ids,
        }
    }
}

/// Signals for one explicitly requested thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadAnalysis {
    pub thread: RedditThread,
    pub comments: Vec<RedditComment>,
    /// Every extracted question, duplicates kept.
    pub questions: Vec<String>,
    pub confusion_markers: u32,
    pub dissatisfaction_markers: u32,
    pub question_count: usize,
}

impl OpportunityEngine {
    /// Samples threads for `keyword` and aggregates their gap signals.
    ///
    /// Only a failed search is an error. Threads whose comments cannot be
    /// fetched are logged and skipped; their ids stay in `thread_ids`.
    pub async fn mine_reddit_gaps(
        &self,
        keyword: &str,
        options: &MiningOptions,
    ) -> Result<GapMiningResult, CoreError> {
        let threads = Self::executor(&self.settings.search)
            .execute("reddit search", || {
                self.discussions
                    .search_threads(keyword, &options.subreddits, options.max_threads)
            })
            .await?;

        let thread_ids: Vec<String> = threads.into_iter().map(|thread| thread.id).collect();
        debug!(keyword = %keyword, threads = thread_ids.len(), "Sampling thread comments");

        let comments_executor = Self::executor(&self.settings.comments);
        let limit = self.settings.max_comments as usize;
        let concurrency = self.settings.comment_concurrency.max(1);

        // `buffered` yields in thread order, so the merge below is independent
        // of which fetch completes first.
        let fetched: Vec<(&String, Result<Vec<RedditComment>, CoreError>)> =
            stream::iter(thread_ids.iter())
                .map(|thread_id| {
                    let executor = &comments_executor;
                    async move {
                        let result = executor
                            .execute("reddit comments", || {
                                self.discussions.get_comments(thread_id, limit)
                            })
                            .await;
                        (thread_id, result)
                    }
                })
                .buffered(concurrency)
                .collect()
                .await;

        let mut accumulator = GapAccumulator::default();
        let mut failed = 0usize;
        for (thread_id, result) in fetched {
            match result {
                Ok(comments) => accumulator.absorb(&comments),
                Err(e) => {
                    failed += 1;
                    warn!(thread_id = %thread_id, "Skipping thread, comments unavailable: {}", e);
                }
            }
        }

        let mentions = thread_ids.len() as u32;
        let result = accumulator.finish(mentions, thread_ids);
        info!(
            keyword = %keyword,
            mentions = result.gap.reddit_mentions,
            repeated = result.gap.repeated_questions,
            failed_threads = failed,
            "Mined community gaps"
        );
        Ok(result)
    }

    /// Fetches one thread with its comments and runs every extractor over them.
    pub async fn analyze_thread(&self, thread_id: &str) -> Result<ThreadAnalysis, CoreError> {
        let thread = Self::executor(&self.settings.search)
            .execute("reddit thread", || self.discussions.get_thread(thread_id))
            .await?;

        let limit = self.settings.max_comments as usize;
        let comments = Self::executor(&self.settings.comments)
            .execute("reddit comments", || {
                self.discussions.get_comments(thread_id, limit)
            })
            .await?;

        let mut questions = Vec::new();
        let mut confusion_markers = 0;
        let mut dissatisfaction_markers = 0;
        for comment in &comments {
            let signals = TextSignals::scan(&comment.body);
            questions.extend(signals.questions);
            confusion_markers += signals.confusion;
            dissatisfaction_markers += signals.dissatisfaction;
        }

        Ok(ThreadAnalysis {
            question_count: questions.len(),
            thread,
            comments,
            questions,
            confusion_markers,
            dissatisfaction_markers,
        })
    }
}
