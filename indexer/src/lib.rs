//! Corpus to inverted index: tokenize every document, spill triples, merge
//! them (bounded mode), then group them into term entries on disk.

use search_core::corpus::{corpus_files, read_documents};
use search_core::index::{IndexBuilder, IndexStats, IndexWriter};
use search_core::merge::{external_sort, read_triples};
use search_core::persist::{save_meta, IndexPaths, MetaFile};
use search_core::spill::{SpillManager, Spilled};
use search_core::{Accumulator, BuildConfig, Normalizer, Result};
use serde::Serialize;
use std::fs;

/// Summary of a finished build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub files: usize,
    pub stats: IndexStats,
    /// Spill segments written; zero for unbounded builds.
    pub segments: usize,
    pub merged_triples: usize,
}

pub fn build_index(config: &BuildConfig) -> Result<BuildReport> {
    let files = corpus_files(&config.corpus_dir)?;
    let paths = IndexPaths::new(&config.output_dir);
    fs::create_dir_all(paths.indexes_dir())?;

    let normalizer = Normalizer::new(config.index_type, &config.stop_words);
    let mut spill = SpillManager::new(config.memory, &paths.temp_dir(), config.max_open_segments)?;
    let mut doc_ids = Vec::new();

    for file in &files {
        let docs = read_documents(file)?;
        if docs.is_empty() {
            tracing::warn!(path = %file.display(), "no <DOC> records");
        }
        for doc in docs {
            config.cancel.check()?;
            let mut acc = Accumulator::for_index(config.index_type);
            for line in doc.lines() {
                normalizer.normalize_line(line, &mut acc);
            }
            spill.extend(acc.into_triples(&doc.doc_id))?;
            doc_ids.push(doc.doc_id);
        }
    }
    tracing::info!(num_docs = doc_ids.len(), files = files.len(), index_type = %config.index_type, "ingested documents");

    let writer = IndexWriter::create(&paths, config.index_type, &doc_ids)?;
    let mut builder = IndexBuilder::new(writer, config.memory);
    let (segments, merged_triples) = match spill.finish()? {
        Spilled::InMemory(triples) => {
            let count = triples.len();
            for t in triples {
                builder.push(t)?;
            }
            (0, count)
        }
        Spilled::Segments(mut pool) => {
            let merged = external_sort(&mut pool, &paths.merged_triples())?;
            for t in read_triples(&paths.merged_triples())? {
                builder.push(t?)?;
            }
            (pool.len(), merged)
        }
    };
    let stats = builder.finish()?;

    let meta = MetaFile::new(config.index_type, stats.num_docs, stats.num_terms, config.memory, segments);
    save_meta(&paths, &meta)?;
    tracing::info!(num_terms = stats.num_terms, num_docs = stats.num_docs, segments, "index build complete");

    Ok(BuildReport { files: files.len(), stats, segments, merged_triples })
}
