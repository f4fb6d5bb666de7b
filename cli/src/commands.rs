//! Command handlers.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use strudel_retrieval::{
    IndexSource, PatternRecord, PatternSearcher, RetrievalConfig, RetrievalError, SearchResult,
};
use tracing::debug;

/// Global flags that override the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub corpus: Option<PathBuf>,
    pub cache: Option<PathBuf>,
}

impl Overrides {
    /// Load the config (explicit file, else the default location if it
    /// exists, else built-in defaults) and apply the flags on top.
    pub fn resolve(&self) -> anyhow::Result<RetrievalConfig> {
        let mut config = match &self.config {
            Some(path) => RetrievalConfig::load(path)?,
            None => match RetrievalConfig::default_path() {
                Some(path) => RetrievalConfig::load_or_default(path)?,
                None => RetrievalConfig::default(),
            },
        };

        if let Some(corpus) = &self.corpus {
            config.corpus_path = corpus.clone();
        }
        if let Some(cache) = &self.cache {
            config.cache_path = cache.clone();
        }
        debug!("Using config {config:?}");
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// What the pattern should sound like
    pub query: String,

    /// Number of results
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Drop results scoring below this
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SimilarArgs {
    /// Id of the reference pattern
    pub id: String,

    /// Number of results
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

async fn open(overrides: &Overrides) -> anyhow::Result<(RetrievalConfig, PatternSearcher)> {
    let config = overrides.resolve()?;
    let searcher = PatternSearcher::from_config(&config)
        .await
        .with_context(|| format!("failed to load corpus {}", config.corpus_path.display()))?;
    Ok((config, searcher))
}

pub async fn index(overrides: &Overrides, force: bool) -> anyhow::Result<()> {
    let (config, searcher) = open(overrides).await?;
    let outcome = searcher.build_index(force).await?;

    match outcome.source {
        IndexSource::Cache => println!(
            "Loaded index for {} patterns from {}",
            outcome.patterns,
            config.cache_path.display()
        ),
        IndexSource::Computed => println!(
            "Computed index for {} patterns with {}, saved to {}",
            outcome.patterns,
            searcher.embedder().model_name(),
            config.cache_path.display()
        ),
    }
    Ok(())
}

pub async fn search(overrides: &Overrides, args: SearchArgs) -> anyhow::Result<()> {
    let (config, searcher) = open(overrides).await?;
    let top_k = args.top_k.unwrap_or(config.search.top_k);
    let min_score = args.min_score.unwrap_or(config.search.min_score);

    let results = searcher.search(&args.query, top_k, min_score).await?;
    print_results(&results, args.json)
}

pub async fn similar(overrides: &Overrides, args: SimilarArgs) -> anyhow::Result<()> {
    let (config, searcher) = open(overrides).await?;
    let top_k = args.top_k.unwrap_or(config.search.similar_top_k);

    let results = match searcher.similar_to(&args.id, top_k).await {
        Err(RetrievalError::PatternNotFound(id)) => anyhow::bail!("pattern not found: {id}"),
        other => other?,
    };
    print_results(&results, args.json)
}

pub async fn patterns(overrides: &Overrides) -> anyhow::Result<()> {
    let (_, searcher) = open(overrides).await?;
    for pattern in searcher.patterns() {
        println!("{:<24} {:<32} {}", pattern.id, pattern.name, pattern.mood);
    }
    Ok(())
}

pub async fn show(overrides: &Overrides, id: &str) -> anyhow::Result<()> {
    let (_, searcher) = open(overrides).await?;
    let pattern = searcher
        .pattern(id)
        .ok_or_else(|| anyhow::anyhow!("pattern not found: {id}"))?;
    print!("{}", format_pattern(pattern));
    Ok(())
}

fn print_results(results: &[SearchResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
    } else if results.is_empty() {
        println!("No matching patterns");
    } else {
        print!("{}", format_results(results));
    }
    Ok(())
}

fn format_results(results: &[SearchResult]) -> String {
    let mut out = String::new();
    for result in results {
        let pattern = &result.pattern;
        let _ = writeln!(
            out,
            "[{:.3}] {} - {} ({})",
            result.score, pattern.id, pattern.name, pattern.mood
        );
    }
    out
}

fn format_pattern(pattern: &PatternRecord) -> String {
    format!(
        "{}\n{}\n\nmood:  {}\ntempo: {}\ntags:  {}\n\n{}\n",
        pattern.name,
        pattern.description,
        pattern.mood,
        pattern.tempo,
        pattern.tags.join(", "),
        pattern.code
    )
}
