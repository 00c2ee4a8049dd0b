use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use gapscout_core::{
    ConfigError, CoreError, EngineSettings, GapSignals, KeywordInput, KeywordMetrics,
    KeywordMetricsError, LlmError, RedditApiError, RedditComment, RedditThread,
};
use keyword_metrics::KeywordMetricsProvider;
use llm_interface::LlmProvider;
use opportunity_engine::{
    opportunity_score, placeholder_hints, BatchOptions, BuildOptions, CancelFlag,
    MiningOptions, OpportunityEngine,
};
use reddit_client::DiscussionSource;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn thread(id: &str) -> RedditThread {
    RedditThread {
        id: id.to_string(),
        scope: "r/HomeImprovement".to_string(),
        title: format!("Thread {}", id),
        url: format!("https://reddit.com/r/HomeImprovement/comments/{}/", id),
        score: 10,
        comment_count: 3,
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    }
}

#[derive(Default)]
struct FakeReddit {
    threads: HashMap<String, Vec<String>>,
    comments: HashMap<String, Vec<String>>,
    failing_searches: HashSet<String>,
    failing_threads: HashSet<String>,
    delays_ms: HashMap<String, u64>,
    cancel_on_search: Option<(String, CancelFlag)>,
    search_calls: AtomicUsize,
    searches: Mutex<Vec<(String, Vec<String>, u32)>>,
}

impl FakeReddit {
    fn new() -> Self {
        Self::default()
    }

    fn with_thread(mut self, keyword: &str, thread_id: &str, bodies: &[&str]) -> Self {
        self.threads
            .entry(keyword.to_string())
            .or_default()
            .push(thread_id.to_string());
        self.comments.insert(
            thread_id.to_string(),
            bodies.iter().map(|b| b.to_string()).collect(),
        );
        self
    }

    fn with_failing_search(mut self, keyword: &str) -> Self {
        self.failing_searches.insert(keyword.to_string());
        self
    }

    fn with_failing_thread(mut self, thread_id: &str) -> Self {
        self.failing_threads.insert(thread_id.to_string());
        self
    }

    fn with_delay(mut self, thread_id: &str, millis: u64) -> Self {
        self.delays_ms.insert(thread_id.to_string(), millis);
        self
    }

    fn cancelling_on(mut self, keyword: &str, flag: CancelFlag) -> Self {
        self.cancel_on_search = Some((keyword.to_string(), flag));
        self
    }

    fn searched_keywords(&self) -> Vec<String> {
        self.searches
            .lock()
            .unwrap()
            .iter()
            .map(|(keyword, _, _)| keyword.clone())
            .collect()
    }
}

#[async_trait]
impl DiscussionSource for FakeReddit {
    async fn search_threads(
        &self,
        keyword: &str,
        subreddits: &[String],
        limit: u32,
    ) -> Result<Vec<RedditThread>, CoreError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.searches
            .lock()
            .unwrap()
            .push((keyword.to_string(), subreddits.to_vec(), limit));

        if let Some((trigger, flag)) = &self.cancel_on_search {
            if trigger == keyword {
                flag.cancel();
            }
        }
        if self.failing_searches.contains(keyword) {
            return Err(CoreError::RedditApi(RedditApiError::Forbidden {
                resource: "/search".to_string(),
            }));
        }

        Ok(self
            .threads
            .get(keyword)
            .map(|ids| ids.iter().take(limit as usize).map(|id| thread(id)).collect())
            .unwrap_or_default())
    }

    async fn get_comments(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<RedditComment>, CoreError> {
        if let Some(millis) = self.delays_ms.get(thread_id) {
            tokio::time::sleep(Duration::from_millis(*millis)).await;
        }
        if self.failing_threads.contains(thread_id) {
            return Err(CoreError::RedditApi(RedditApiError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            }));
        }

        let bodies = self.comments.get(thread_id).cloned().unwrap_or_default();
        Ok(bodies
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, body)| RedditComment {
                id: format!("{}_{}", thread_id, i),
                body,
                score: 1,
                created_at: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
                parent_id: format!("t3_{}", thread_id),
                thread_id: thread_id.to_string(),
            })
            .collect())
    }

    async fn get_thread(&self, thread_id: &str) -> Result<RedditThread, CoreError> {
        if self.comments.contains_key(thread_id) {
            Ok(thread(thread_id))
        } else {
            Err(CoreError::RedditApi(RedditApiError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            }))
        }
    }
}

struct FakeLlm {
    reply: Result<String, LlmError>,
    calls: AtomicUsize,
}

impl FakeLlm {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(error: LlmError) -> Self {
        Self {
            reply: Err(error),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(prompt.starts_with("Keyword: "));
        self.reply.clone().map_err(CoreError::Llm)
    }
}

struct FakeMetrics {
    ideas: Vec<KeywordMetrics>,
}

#[async_trait]
impl KeywordMetricsProvider for FakeMetrics {
    async fn keyword_ideas(&self, _seed: &str) -> Result<Vec<KeywordMetrics>, CoreError> {
        Ok(self.ideas.clone())
    }
}

fn metrics(keyword: &str, volume: u64, difficulty: f64) -> KeywordMetrics {
    KeywordMetrics {
        keyword: keyword.to_string(),
        volume,
        difficulty,
        cpc: Some(4.2),
        competition: Some(0.3),
        serp_features: vec![
            "organic".to_string(),
            "people_also_ask".to_string(),
            "organic".to_string(),
        ],
        task_id: Some(format!("task-{}", keyword.replace(' ', "-"))),
    }
}

fn as_refs(bodies: &[String]) -> Vec<&str> {
    bodies.iter().map(String::as_str).collect()
}

fn engine(reddit: Arc<FakeReddit>) -> OpportunityEngine {
    OpportunityEngine::new(reddit, EngineSettings::default())
}

fn roof_leak_reddit() -> FakeReddit {
    FakeReddit::new()
        .with_thread(
            "roof leak",
            "t1",
            &[
                "How do I find the source of a roof leak? I'm confused.",
                "Tried everything, still stuck",
            ],
        )
        .with_thread(
            "roof leak",
            "t2",
            &["How do I find the source of a roof leak? Not sure where to start."],
        )
        .with_thread(
            "roof leak",
            "t3",
            &[
                "How do I find the source of a roof leak?",
                "Should I call a roofer? Frustrated with this.",
            ],
        )
}

#[tokio::test]
async fn test_mining_aggregates_signals() {
    let reddit = Arc::new(roof_leak_reddit());
    let result = engine(reddit.clone())
        .mine_reddit_gaps("roof leak", &MiningOptions::default())
        .await
        .unwrap();

    assert_eq!(result.gap, GapSignals::new(3, 1, 2, 3));
    assert_eq!(result.top_questions, vec!["How do I find the source of a roof leak"]);
    assert_eq!(result.thread_ids, vec!["t1", "t2", "t3"]);

    let searches = reddit.searches.lock().unwrap();
    assert_eq!(searches[0].1, vec!["all"]);
    assert_eq!(searches[0].2, 25);
}

#[tokio::test]
async fn test_mining_tolerates_one_failing_thread() {
    let reddit = Arc::new(roof_leak_reddit().with_failing_thread("t2"));
    let result = engine(reddit)
        .mine_reddit_gaps("roof leak", &MiningOptions::default())
        .await
        .unwrap();

    // t2's question and confusion marker are gone, its id is kept
    assert_eq!(result.gap, GapSignals::new(3, 0, 1, 3));
    assert!(result.top_questions.is_empty());
    assert_eq!(result.thread_ids, vec!["t1", "t2", "t3"]);
}

#[tokio::test]
async fn test_mining_propagates_search_failure() {
    let reddit = Arc::new(roof_leak_reddit().with_failing_search("roof leak"));
    let error = engine(reddit.clone())
        .mine_reddit_gaps("roof leak", &MiningOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        CoreError::RedditApi(RedditApiError::Forbidden { .. })
    ));
    // not retryable, so a single attempt
    assert_eq!(reddit.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mining_without_threads() {
    let reddit = Arc::new(FakeReddit::new());
    let result = engine(reddit)
        .mine_reddit_gaps("obscure topic", &MiningOptions::default())
        .await
        .unwrap();

    assert_eq!(result.gap, GapSignals::default());
    assert!(result.top_questions.is_empty());
    assert!(result.thread_ids.is_empty());
}

#[tokio::test]
async fn test_concurrent_mining_merges_in_thread_order() {
    let repeated = |question: &str| vec![question.to_string(); 3];
    let first = repeated("What is the first option?");
    let second = repeated("What is the second option?");

    let build = || {
        FakeReddit::new()
            .with_thread("siding", "slow", &as_refs(&first))
            .with_thread("siding", "fast", &as_refs(&second))
            .with_delay("slow", 50)
    };

    let mut settings = EngineSettings::default();
    settings.comment_concurrency = 4;
    let concurrent = OpportunityEngine::new(Arc::new(build()), settings)
        .mine_reddit_gaps("siding", &MiningOptions::default())
        .await
        .unwrap();

    let mut settings = EngineSettings::default();
    settings.comment_concurrency = 1;
    let sequential = OpportunityEngine::new(Arc::new(build()), settings)
        .mine_reddit_gaps("siding", &MiningOptions::default())
        .await
        .unwrap();

    assert_eq!(
        concurrent.top_questions,
        vec!["What is the first option", "What is the second option"]
    );
    assert_eq!(concurrent, sequential);
}

#[tokio::test]
async fn test_build_opportunity_assembles_record() {
    let reddit = Arc::new(roof_leak_reddit());
    let opportunity = engine(reddit)
        .build_opportunity("roof leak", 2_400, 35.0, &BuildOptions::default())
        .await
        .unwrap();

    let gap = GapSignals::new(3, 1, 2, 3);
    assert_eq!(opportunity.keyword, "roof leak");
    assert_eq!(opportunity.volume, 2_400);
    assert_eq!(opportunity.difficulty, 0.35);
    assert_eq!(opportunity.gap, gap);
    assert_eq!(opportunity.opportunity_score, opportunity_score(2_400, 35.0, &gap));
    assert!(opportunity.intents.is_empty());
    assert_eq!(opportunity.sources.reddit_threads, vec!["t1", "t2", "t3"]);
    assert_eq!(opportunity.sources.data_for_seo_task_id, None);
    assert_eq!(opportunity.aeo, Some(placeholder_hints("roof leak")));
}

#[tokio::test]
async fn test_build_opportunity_is_idempotent() {
    let engine = engine(Arc::new(roof_leak_reddit()));
    let options = BuildOptions::default();

    let first = engine
        .build_opportunity("roof leak", 880, 61.0, &options)
        .await
        .unwrap();
    let second = engine
        .build_opportunity("roof leak", 880, 61.0, &options)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn test_build_without_aeo_and_with_clamped_difficulty() {
    let options = BuildOptions {
        include_aeo: false,
        ..BuildOptions::default()
    };
    let opportunity = engine(Arc::new(roof_leak_reddit()))
        .build_opportunity("roof leak", 5, 140.0, &options)
        .await
        .unwrap();

    assert!(opportunity.aeo.is_none());
    assert_eq!(opportunity.difficulty, 1.0);

    let json = serde_json::to_value(&opportunity).unwrap();
    assert!(json.get("aeo").is_none());
    assert!(json["gap"].get("redditMentions").is_some());
    assert!(json.get("opportunityScore").is_some());
}

#[tokio::test]
async fn test_build_rejects_empty_keyword() {
    let error = engine(Arc::new(FakeReddit::new()))
        .build_opportunity("   ", 100, 10.0, &BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(error, CoreError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_aeo_hints_from_llm() {
    let llm = Arc::new(FakeLlm::replying(
        r#"{"canonicalAnswer": "Trace water stains upward from the ceiling.", "keyBullets": ["Inspect flashing", "Wear fall protection", "Ceiling stays dry after rain"]}"#,
    ));
    let engine = engine(Arc::new(roof_leak_reddit())).with_llm(llm.clone());
    assert!(engine.has_llm());

    let opportunity = engine
        .build_opportunity("roof leak", 1_000, 20.0, &BuildOptions::default())
        .await
        .unwrap();

    let aeo = opportunity.aeo.unwrap();
    assert_eq!(aeo.canonical_answer, "Trace water stains upward from the ceiling.");
    assert_eq!(aeo.key_bullets.len(), 3);
    assert!(aeo.citations.is_empty());
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_aeo_failure_degrades_to_placeholder() {
    let llm = Arc::new(FakeLlm::failing(LlmError::InvalidApiKey {
        provider: "fake".to_string(),
    }));
    let engine = engine(Arc::new(roof_leak_reddit())).with_llm(llm);

    let hints = engine.generate_aeo_hints("roof leak", &[]).await;
    assert_eq!(hints, placeholder_hints("roof leak"));

    let garbled = engine
        .with_llm(Arc::new(FakeLlm::replying("I cannot help with that.")))
        .generate_aeo_hints("roof leak", &[])
        .await;
    assert_eq!(garbled, placeholder_hints("roof leak"));
}

fn batch_reddit() -> FakeReddit {
    FakeReddit::new()
        .with_thread("alpha", "a1", &["Is this normal?"])
        .with_thread("charlie", "c1", &["Why is this so confusing?"])
        .with_thread("charlie", "c2", &["Anyone know a fix? Tried everything."])
        .with_failing_search("bravo")
}

#[tokio::test]
async fn test_batch_skips_failures_and_ranks() {
    let reddit = Arc::new(batch_reddit());
    let keywords = vec![
        KeywordInput::new("alpha", 100, 60.0),
        KeywordInput::new("bravo", 50_000, 5.0),
        KeywordInput::new("charlie", 12_000, 20.0),
    ];

    let report = engine(reddit.clone())
        .find_best_opportunities(&keywords, &BatchOptions::default(), &CancelFlag::new())
        .await;

    let ranked: Vec<&str> = report
        .opportunities
        .iter()
        .map(|o| o.keyword.as_str())
        .collect();
    assert_eq!(ranked, vec!["charlie", "alpha"]);
    assert!(report.opportunities[0].opportunity_score > report.opportunities[1].opportunity_score);

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].keyword, "bravo");
    assert_eq!(report.skipped[0].error_code, "REDDIT_FORBIDDEN");
    assert!(!report.cancelled);

    // batch builds use the reduced thread budget
    let searches = reddit.searches.lock().unwrap();
    assert!(searches.iter().all(|(_, _, limit)| *limit == 15));
}

#[tokio::test]
async fn test_batch_min_score_and_top_n() {
    let keywords = vec![
        KeywordInput::new("alpha", 100, 60.0),
        KeywordInput::new("charlie", 12_000, 20.0),
        KeywordInput::new("delta", 10, 100.0),
    ];
    let engine = engine(Arc::new(batch_reddit()));

    let options = BatchOptions {
        min_score: 0.5,
        ..BatchOptions::default()
    };
    let report = engine
        .find_best_opportunities(&keywords, &options, &CancelFlag::new())
        .await;
    assert!(report
        .opportunities
        .iter()
        .all(|o| o.opportunity_score >= 0.5));
    assert!(report.opportunities.iter().all(|o| o.keyword != "delta"));

    let options = BatchOptions {
        top_n: 1,
        ..BatchOptions::default()
    };
    let report = engine
        .find_best_opportunities(&keywords, &options, &CancelFlag::new())
        .await;
    assert_eq!(report.opportunities.len(), 1);
    assert_eq!(report.opportunities[0].keyword, "charlie");
}

#[tokio::test]
async fn test_batch_cancellation_keeps_completed_work() {
    let cancel = CancelFlag::new();
    let reddit = Arc::new(batch_reddit().cancelling_on("alpha", cancel.clone()));
    let keywords = vec![
        KeywordInput::new("alpha", 100, 60.0),
        KeywordInput::new("charlie", 12_000, 20.0),
        KeywordInput::new("delta", 10, 10.0),
    ];

    let report = engine(reddit.clone())
        .find_best_opportunities(&keywords, &BatchOptions::default(), &cancel)
        .await;

    assert!(report.cancelled);
    assert_eq!(report.opportunities.len(), 1);
    assert_eq!(report.opportunities[0].keyword, "alpha");
    assert_eq!(reddit.searched_keywords(), vec!["alpha"]);
}

#[tokio::test]
async fn test_batch_cancelled_before_start() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let reddit = Arc::new(batch_reddit());

    let report = engine(reddit.clone())
        .find_best_opportunities(
            &[KeywordInput::new("alpha", 100, 60.0)],
            &BatchOptions::default(),
            &cancel,
        )
        .await;

    assert!(report.cancelled);
    assert!(report.opportunities.is_empty());
    assert_eq!(reddit.search_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_batch_keeps_input_order_for_ties() {
    let reddit = Arc::new(FakeReddit::new());
    let keywords: Vec<KeywordInput> = ["one", "two", "three", "four", "five"]
        .iter()
        .map(|k| KeywordInput::new(*k, 500, 40.0))
        .collect();
    let options = BatchOptions {
        concurrency: 3,
        include_aeo: false,
        ..BatchOptions::default()
    };

    let report = engine(reddit)
        .find_best_opportunities(&keywords, &options, &CancelFlag::new())
        .await;

    let ranked: Vec<&str> = report
        .opportunities
        .iter()
        .map(|o| o.keyword.as_str())
        .collect();
    assert_eq!(ranked, vec!["one", "two", "three", "four", "five"]);
}

#[tokio::test]
async fn test_build_from_keyword_metrics() {
    let reddit = Arc::new(roof_leak_reddit());
    let provider = Arc::new(FakeMetrics {
        ideas: vec![metrics("roof leak repair", 900, 30.0), metrics("Roof Leak", 2_400, 35.0)],
    });
    let engine = engine(reddit).with_keyword_metrics(provider);

    let opportunity = engine
        .build_opportunity_for_keyword("roof leak", &BuildOptions::default())
        .await
        .unwrap();

    assert_eq!(opportunity.keyword, "roof leak");
    assert_eq!(opportunity.volume, 2_400);
    assert_eq!(opportunity.difficulty, 0.35);
    assert_eq!(opportunity.intents, vec!["organic", "people_also_ask"]);
    assert_eq!(
        opportunity.sources.data_for_seo_task_id.as_deref(),
        Some("task-Roof-Leak")
    );

    let missing = engine
        .build_opportunity_for_keyword("gutter guards", &BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        missing,
        CoreError::KeywordMetrics(KeywordMetricsError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_metrics_operations_need_a_provider() {
    let engine = engine(Arc::new(FakeReddit::new()));

    let error = engine
        .build_opportunity_for_keyword("roof leak", &BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        CoreError::Config(ConfigError::MissingEnvironmentVariable { .. })
    ));

    let error = engine
        .discover_opportunities("roof", &BatchOptions::default(), &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(error, CoreError::Config(_)));
}

#[tokio::test]
async fn test_discover_ranks_keyword_ideas() {
    let reddit = Arc::new(batch_reddit());
    let provider = Arc::new(FakeMetrics {
        ideas: vec![
            metrics("alpha", 100, 60.0),
            metrics("bravo", 50_000, 5.0),
            metrics("charlie", 12_000, 20.0),
        ],
    });
    let engine = engine(reddit).with_keyword_metrics(provider);

    let report = engine
        .discover_opportunities("seed", &BatchOptions::default(), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(report.opportunities.len(), 2);
    assert_eq!(report.opportunities[0].keyword, "charlie");
    assert_eq!(
        report.opportunities[0].sources.data_for_seo_task_id.as_deref(),
        Some("task-charlie")
    );
    assert_eq!(report.opportunities[0].intents, vec!["organic", "people_also_ask"]);
    assert_eq!(report.skipped[0].keyword, "bravo");
}

#[tokio::test]
async fn test_analyze_thread_keeps_duplicate_questions() {
    let reddit = Arc::new(
        FakeReddit::new().with_thread(
            "attic",
            "x1",
            &[
                "Is this mold? Not sure.",
                "Is this mold? Can someone explain the difference?",
                "Waste of time calling them.",
            ],
        ),
    );
    let analysis = engine(reddit).analyze_thread("x1").await.unwrap();

    assert_eq!(analysis.thread.id, "x1");
    assert_eq!(analysis.comments.len(), 3);
    assert_eq!(
        analysis.questions,
        vec!["Is this mold", "Is this mold", "Can someone explain the difference"]
    );
    assert_eq!(analysis.question_count, 3);
    assert_eq!(analysis.confusion_markers, 2);
    assert_eq!(analysis.dissatisfaction_markers, 1);
}

#[tokio::test]
async fn test_analyze_missing_thread_fails() {
    let error = engine(Arc::new(FakeReddit::new()))
        .analyze_thread("gone")
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        CoreError::RedditApi(RedditApiError::ThreadNotFound { .. })
    ));
}
