use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexer::build_index;
use search_core::config::DEFAULT_MAX_OPEN_SEGMENTS;
use search_core::{BuildConfig, CancelToken, IndexType, MemoryLimit, StopWords};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build inverted indexes from a TREC corpus", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one index variant
    Build {
        /// Corpus directory (walked recursively)
        #[arg(long)]
        corpus: PathBuf,
        /// single, stem, positional or phrase
        #[arg(long)]
        index_type: IndexType,
        /// Output directory; indexes/ and lexicon.txt are written here
        #[arg(long)]
        output: PathBuf,
        /// Triples held in memory before spilling; unbounded when omitted
        #[arg(long)]
        memory: Option<usize>,
        /// Stop-word list, one word per line; built-in English list when omitted
        #[arg(long)]
        stops: Option<PathBuf>,
        /// Maximum spill segments open during the merge
        #[arg(long, default_value_t = DEFAULT_MAX_OPEN_SEGMENTS)]
        max_open_segments: usize,
        /// Abort the build after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, index_type, output, memory, stops, max_open_segments, deadline_secs } => {
            let stop_words = match stops {
                Some(path) => StopWords::load(&path)?,
                None => StopWords::english(),
            };
            let cancel = match deadline_secs {
                Some(secs) => CancelToken::with_deadline(Duration::from_secs(secs)),
                None => CancelToken::new(),
            };
            let config = BuildConfig::new(&corpus, &output, index_type, stop_words)
                .with_memory(MemoryLimit::from_option(memory))
                .with_max_open_segments(max_open_segments)
                .with_cancel(cancel);
            let report = build_index(&config).with_context(|| format!("building {index_type} index from {}", corpus.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
