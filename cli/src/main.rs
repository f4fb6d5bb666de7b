//! Strudel pattern search CLI
//!
//! # Commands
//!
//! - `index`: build the embedding index, or adopt a valid cached one
//! - `search`: rank patterns against a free-text query
//! - `similar`: rank patterns against an existing pattern
//! - `patterns`: list the corpus
//! - `show`: print one pattern with its code
//!
//! Logs go to stderr so `--json` output on stdout stays machine readable.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

mod commands;

const LOCAL_MODEL_HELP: &str = "\
The default `local` embedding provider needs a build with the `local-model` feature \
(cargo install --features local-model). Without it, set embedding.provider = \"openai\" \
in the config file, or rely on an existing index cache.";

/// Semantic search over Strudel patterns
#[derive(Parser)]
#[command(name = "strudel")]
#[command(version)]
#[command(about = "Semantic search over a corpus of Strudel patterns")]
#[command(propagate_version = true)]
#[command(after_help = LOCAL_MODEL_HELP)]
struct Cli {
    /// Config file (defaults to <config dir>/strudel/config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pattern corpus, overriding the config
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Index cache file, overriding the config
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Verbosity level (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the embedding index, or adopt a valid cached one
    Index {
        /// Recompute embeddings even if the cache is valid
        #[arg(long)]
        force: bool,
    },
    /// Find patterns matching a free-text description
    Search(commands::SearchArgs),
    /// Find patterns similar to an existing one
    Similar(commands::SimilarArgs),
    /// List every pattern in the corpus
    Patterns,
    /// Print one pattern, including its code
    Show {
        /// Pattern id
        id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let overrides = commands::Overrides {
        config: cli.config,
        corpus: cli.corpus,
        cache: cli.cache,
    };

    let result = match cli.command {
        Command::Index { force } => commands::index(&overrides, force).await,
        Command::Search(args) => commands::search(&overrides, args).await,
        Command::Similar(args) => commands::similar(&overrides, args).await,
        Command::Patterns => commands::patterns(&overrides).await,
        Command::Show { id } => commands::show(&overrides, &id).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
