use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use query::{run_dynamic, run_query};
use search_core::{CancelToken, IndexType, QueryConfig, RetrievalModel, StopWords};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Rank documents for TREC topics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Common {
    /// Build output directory holding indexes/
    #[arg(long)]
    index: PathBuf,
    /// Query file with <num>/<title> topics
    #[arg(long)]
    queries: PathBuf,
    /// Results file to write
    #[arg(long)]
    results: PathBuf,
    /// Stop-word list; built-in English list when omitted
    #[arg(long)]
    stops: Option<PathBuf>,
    /// Abort after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score queries against one index variant
    Run {
        #[command(flatten)]
        common: Common,
        /// cosine, bm25 or lm
        #[arg(long)]
        model: RetrievalModel,
        /// single, stem, positional or phrase
        #[arg(long)]
        index_type: IndexType,
    },
    /// Phrase-aware BM25 over the phrase-filtered, positional and single indexes
    Dynamic {
        #[command(flatten)]
        common: Common,
    },
}

impl Common {
    fn into_config(self) -> Result<QueryConfig> {
        let stop_words = match &self.stops {
            Some(path) => StopWords::load(path)?,
            None => StopWords::english(),
        };
        let cancel = match self.deadline_secs {
            Some(secs) => CancelToken::with_deadline(Duration::from_secs(secs)),
            None => CancelToken::new(),
        };
        Ok(QueryConfig::new(&self.index, &self.queries, &self.results, stop_words).with_cancel(cancel))
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let report = match cli.command {
        Commands::Run { common, model, index_type } => {
            let config = common.into_config()?;
            run_query(&config, model, index_type)
                .with_context(|| format!("{model} over the {index_type} index"))?
        }
        Commands::Dynamic { common } => {
            let config = common.into_config()?;
            run_dynamic(&config).context("dynamic phrase query run")?
        }
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
