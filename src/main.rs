use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gapscout_core::{CoreError, ErrorReporter, GapscoutConfig, KeywordInput};
use keyword_metrics::DataForSeoClient;
use opportunity_engine::{BatchOptions, BuildOptions, CancelFlag, OpportunityEngine};
use reddit_client::{RedditClient, RedditOAuth2Config};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "gapscout=info,opportunity_engine=info,reddit_client=info";

#[derive(Debug, Parser)]
#[command(name = "gapscout")]
#[command(about = "Rank content opportunities by search demand and community gaps")]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Score a single keyword.
    Score {
        keyword: String,
        /// Monthly search volume; looked up from DataForSEO when omitted.
        #[arg(long, requires = "difficulty")]
        volume: Option<u64>,
        /// Keyword difficulty on the 0-100 scale.
        #[arg(long, requires = "volume")]
        difficulty: Option<f64>,
        #[arg(long = "subreddit")]
        subreddits: Vec<String>,
        #[arg(long)]
        max_threads: Option<u32>,
        #[arg(long)]
        no_aeo: bool,
    },
    /// Score a JSON file of `{keyword, volume, difficulty}` entries and rank them.
    Batch {
        input: PathBuf,
        #[command(flatten)]
        ranking: RankingArgs,
    },
    /// Expand a seed keyword through DataForSEO and rank the ideas.
    Discover {
        seed: String,
        #[command(flatten)]
        ranking: RankingArgs,
    },
    /// Extract signals from one thread.
    Analyze { thread_id: String },
}

#[derive(Debug, Args)]
struct RankingArgs {
    #[arg(long, default_value_t = 10)]
    top_n: usize,
    #[arg(long, default_value_t = 0.0)]
    min_score: f64,
    /// Keywords processed at the same time.
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long = "subreddit")]
    subreddits: Vec<String>,
    #[arg(long)]
    no_aeo: bool,
}

impl RankingArgs {
    fn options(&self, config: &GapscoutConfig) -> BatchOptions {
        let mut options = BatchOptions::from_settings(&config.engine);
        options.top_n = self.top_n;
        options.min_score = self.min_score;
        options.include_aeo = !self.no_aeo;
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency;
        }
        if !self.subreddits.is_empty() {
            options.subreddits = self.subreddits.clone();
        }
        options
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<GapscoutConfig> {
    let config = match path {
        Some(path) => GapscoutConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GapscoutConfig::from_env()?,
    };
    Ok(config)
}

fn build_engine(config: &GapscoutConfig) -> Result<OpportunityEngine> {
    let reddit = RedditClient::new(RedditOAuth2Config::from_settings(&config.reddit)?)?
        .with_time_window(config.engine.time_window.clone())
        .with_max_reply_depth(config.engine.max_reply_depth);

    let mut engine = OpportunityEngine::new(Arc::new(reddit), config.engine.clone());
    if let Some(llm) = llm_interface::provider_from_settings(&config.llm)? {
        engine = engine.with_llm(llm);
    }
    if config.dataforseo.api_key.is_some() {
        let metrics = DataForSeoClient::from_settings(&config.dataforseo)?;
        engine = engine.with_keyword_metrics(Arc::new(metrics));
    }
    Ok(engine)
}

/// Raises the flag on Ctrl-C so a running batch returns what it has.
fn cancel_on_interrupt() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing keywords already in progress");
            flag.cancel();
        }
    });
    cancel
}

async fn run(cli: Cli) -> Result<Value> {
    let config = load_config(cli.config.as_ref())?;
    let engine = build_engine(&config)?;

    let output = match cli.command {
        Commands::Score {
            keyword,
            volume,
            difficulty,
            subreddits,
            max_threads,
            no_aeo,
        } => {
            let mut options = BuildOptions::from_settings(&config.engine);
            options.include_aeo = !no_aeo;
            if !subreddits.is_empty() {
                options.subreddits = subreddits;
            }
            if let Some(max_threads) = max_threads {
                options.max_threads = max_threads;
            }

            let opportunity = match (volume, difficulty) {
                (Some(volume), Some(difficulty)) => {
                    engine
                        .build_opportunity(&keyword, volume, difficulty, &options)
                        .await?
                }
                _ => engine.build_opportunity_for_keyword(&keyword, &options).await?,
            };
            serde_json::to_value(opportunity)?
        }
        Commands::Batch { input, ranking } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let keywords: Vec<KeywordInput> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", input.display()))?;

            let report = engine
                .find_best_opportunities(&keywords, &ranking.options(&config), &cancel_on_interrupt())
                .await;
            serde_json::to_value(report)?
        }
        Commands::Discover { seed, ranking } => {
            let report = engine
                .discover_opportunities(&seed, &ranking.options(&config), &cancel_on_interrupt())
                .await?;
            serde_json::to_value(report)?
        }
        Commands::Analyze { thread_id } => {
            serde_json::to_value(engine.analyze_thread(&thread_id).await?)?
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            if let Some(core) = e.downcast_ref::<CoreError>() {
                ErrorReporter::new().report_error(core);
            }
            Err(e)
        }
    }
}
