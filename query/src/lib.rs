use search_core::corpus::{read_queries, Query};
use search_core::persist::{create_text, IndexPaths};
use search_core::planner::QueryPlanner;
use search_core::scoring::{score_query, ScoreBoard, MAX_RESULTS};
use search_core::{DocId, IndexType, InvertedIndex, Normalizer, QueryConfig, Result, RetrievalModel};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub queries: usize,
    pub result_lines: usize,
    pub took_s: f64,
}

/// TREC run file writer: `queryNum 0 docID rank score MODEL`.
pub struct ResultsWriter {
    out: BufWriter<File>,
    lines: usize,
}

impl ResultsWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self { out: create_text(path)?, lines: 0 })
    }

    pub fn write_ranking(&mut self, query_num: &str, ranked: &[(DocId, f64)], label: &str) -> Result<()> {
        for (rank, (doc_id, score)) in ranked.iter().enumerate() {
            writeln!(self.out, "{query_num} 0 {doc_id} {rank} {score} {label}")?;
        }
        self.lines += ranked.len();
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        self.out.flush()?;
        Ok(self.lines)
    }
}

fn answer<F>(config: &QueryConfig, label: &str, mut score: F) -> Result<QueryReport>
where
    F: FnMut(&Query) -> ScoreBoard,
{
    let start = Instant::now();
    let queries = read_queries(&config.query_file)?;
    let mut writer = ResultsWriter::create(&config.results_file)?;
    for query in &queries {
        config.cancel.check()?;
        let board = score(query);
        let ranked = board.ranked(MAX_RESULTS);
        tracing::debug!(query = %query.num, hits = board.len(), "answered query");
        writer.write_ranking(&query.num, &ranked, label)?;
    }
    let result_lines = writer.finish()?;
    let took_s = start.elapsed().as_secs_f64();
    tracing::info!(queries = queries.len(), result_lines, took_s, "query run complete");
    Ok(QueryReport { queries: queries.len(), result_lines, took_s })
}

/// Score every query in the query file against one index variant.
pub fn run_query(config: &QueryConfig, model: RetrievalModel, index_type: IndexType) -> Result<QueryReport> {
    let paths = IndexPaths::new(&config.index_dir);
    let index = InvertedIndex::load(&paths, index_type.as_str())?;
    let normalizer = Normalizer::new(index_type, &config.stop_words);
    answer(config, model.label(), |query| {
        let terms = normalizer.query_terms(&query.text).term_frequencies();
        score_query(&index, &terms, model)
    })
}

/// Answer every query with the tiered phrase planner.
pub fn run_dynamic(config: &QueryConfig) -> Result<QueryReport> {
    let planner = QueryPlanner::load(&IndexPaths::new(&config.index_dir), config.stop_words.clone())?;
    answer(config, RetrievalModel::Bm25.label(), |query| {
        let (scores, trace) = planner.plan(&query.text);
        tracing::debug!(
            query = %query.num,
            phrases = trace.phrases,
            filtered_hits = trace.filtered_hits,
            confirmations = trace.confirmations,
            single_fallback = trace.single_fallback,
            "planned query"
        );
        scores
    })
}
