use crate::cancel::CancelToken;
use crate::tokenizer::StopWords;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Upper bound on spill segments opened together during the merge.
pub const DEFAULT_MAX_OPEN_SEGMENTS: usize = 512;

/// Inverted index variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Single,
    Stem,
    Positional,
    Phrase,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Single => "single",
            IndexType::Stem => "stem",
            IndexType::Positional => "positional",
            IndexType::Phrase => "phrase",
        }
    }

    pub fn extracts_special_tokens(&self) -> bool {
        matches!(self, IndexType::Single)
    }

    pub fn drops_stop_words(&self) -> bool {
        !matches!(self, IndexType::Positional)
    }

    pub fn tracks_positions(&self) -> bool {
        matches!(self, IndexType::Positional)
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(IndexType::Single),
            "stem" => Ok(IndexType::Stem),
            "positional" => Ok(IndexType::Positional),
            "phrase" => Ok(IndexType::Phrase),
            _ => Err(Error::UnknownIndexType(s.to_string())),
        }
    }
}

/// How many triples (and, while building, terms) may be held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLimit {
    Unlimited,
    Triples(usize),
}

impl MemoryLimit {
    pub fn from_option(limit: Option<usize>) -> Self {
        match limit {
            Some(n) => MemoryLimit::Triples(n.max(1)),
            None => MemoryLimit::Unlimited,
        }
    }

    pub fn cap(&self) -> Option<usize> {
        match self {
            MemoryLimit::Unlimited => None,
            MemoryLimit::Triples(n) => Some(*n),
        }
    }
}

/// Everything one index build needs; handed to each stage explicitly.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub corpus_dir: PathBuf,
    pub output_dir: PathBuf,
    pub index_type: IndexType,
    pub memory: MemoryLimit,
    pub max_open_segments: usize,
    pub stop_words: StopWords,
    pub cancel: CancelToken,
}

impl BuildConfig {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(corpus_dir: P, output_dir: Q, index_type: IndexType, stop_words: StopWords) -> Self {
        Self {
            corpus_dir: corpus_dir.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            index_type,
            memory: MemoryLimit::Unlimited,
            max_open_segments: DEFAULT_MAX_OPEN_SEGMENTS,
            stop_words,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_memory(mut self, memory: MemoryLimit) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_max_open_segments(mut self, max_open: usize) -> Self {
        self.max_open_segments = max_open.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Inputs shared by the static and the dynamic query commands.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub index_dir: PathBuf,
    pub query_file: PathBuf,
    pub results_file: PathBuf,
    pub stop_words: StopWords,
    pub cancel: CancelToken,
}

impl QueryConfig {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(index_dir: P, query_file: Q, results_file: R, stop_words: StopWords) -> Self {
        Self {
            index_dir: index_dir.as_ref().to_path_buf(),
            query_file: query_file.as_ref().to_path_buf(),
            results_file: results_file.as_ref().to_path_buf(),
            stop_words,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}
