use crate::config::{IndexType, MemoryLimit};
use crate::index::TermEntry;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const FORMAT_VERSION: u32 = 1;

/// Name of the `df > 1` subset written alongside the phrase index.
pub const PHRASE_FILTERED: &str = "phrase-filtered";

/// Build manifest, `indexes/<variant>-meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub index_type: IndexType,
    pub num_docs: usize,
    pub num_terms: usize,
    pub memory: MemoryLimit,
    pub segments: usize,
    pub created_at: String,
    pub version: u32,
}

impl MetaFile {
    pub fn new(index_type: IndexType, num_docs: usize, num_terms: usize, memory: MemoryLimit, segments: usize) -> Self {
        let created_at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        Self { index_type, num_docs, num_terms, memory, segments, created_at, version: FORMAT_VERSION }
    }
}

/// File layout under an output directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn indexes_dir(&self) -> PathBuf { self.root.join("indexes") }
    pub fn index_file(&self, name: &str) -> PathBuf { self.indexes_dir().join(format!("{name}.txt")) }
    pub fn doc_length_file(&self, name: &str) -> PathBuf { self.indexes_dir().join(format!("{name}-docLength.txt")) }
    pub fn meta(&self, name: &str) -> PathBuf { self.indexes_dir().join(format!("{name}-meta.json")) }
    pub fn lexicon(&self) -> PathBuf { self.root.join("lexicon.txt") }
    pub fn temp_dir(&self) -> PathBuf { self.root.join("temp") }
    pub fn merged_triples(&self) -> PathBuf { self.root.join("merged-triples.txt") }
}

/// Create (truncating) a text file, making parent directories as needed.
pub fn create_text(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Open a text file for reading; a missing file is reported as `kind`.
pub fn open_text(path: &Path, kind: &'static str) -> Result<BufReader<File>> {
    match File::open(path) {
        Ok(f) => Ok(BufReader::new(f)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::missing(kind, path)),
        Err(e) => Err(e.into()),
    }
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let mut f = create_text(&paths.meta(meta.index_type.as_str()))?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    f.flush()?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths, index_type: IndexType) -> Result<MetaFile> {
    let mut f = open_text(&paths.meta(index_type.as_str()), "index manifest")?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Read every term line of an index file.
pub fn load_term_entries(path: &Path) -> Result<Vec<TermEntry>> {
    let reader = open_text(path, "index file")?;
    let mut entries = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = TermEntry::parse(&line).map_err(|reason| Error::Malformed {
            what: "index line",
            path: path.to_path_buf(),
            line: n + 1,
            reason,
        })?;
        entries.push(entry);
    }
    Ok(entries)
}
