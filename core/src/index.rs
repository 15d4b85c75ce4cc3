use crate::accumulator::{Payload, Triple};
use crate::config::{IndexType, MemoryLimit};
use crate::persist::{create_text, load_term_entries, open_text, IndexPaths, PHRASE_FILTERED};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

pub type DocId = String;

/// One document's entry in a posting list; serialized as `[docID, payload]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(DocId, Payload)", into = "(DocId, Payload)")]
pub struct Posting {
    pub doc_id: DocId,
    pub payload: Payload,
}

impl Posting {
    pub fn new(doc_id: impl Into<DocId>, payload: Payload) -> Self {
        Self { doc_id: doc_id.into(), payload }
    }

    pub fn tf(&self) -> u32 {
        self.payload.tf()
    }
}

impl From<(DocId, Payload)> for Posting {
    fn from((doc_id, payload): (DocId, Payload)) -> Self {
        Posting { doc_id, payload }
    }
}

impl From<Posting> for (DocId, Payload) {
    fn from(p: Posting) -> Self {
        (p.doc_id, p.payload)
    }
}

/// `ln((N - df + 0.5) / (df + 0.5))`.
pub fn idf(num_docs: usize, df: usize) -> f64 {
    let n = num_docs as f64;
    let df = df as f64;
    ((n - df + 0.5) / (df + 0.5)).ln()
}

/// A term with its statistics and posting list (sorted, one per document).
#[derive(Debug, Clone, PartialEq)]
pub struct TermEntry {
    term: String,
    idf: f64,
    cf: u64,
    postings: Vec<Posting>,
}

impl TermEntry {
    /// Sorts postings by document and folds repeated documents together.
    pub fn new(term: impl Into<String>, mut postings: Vec<Posting>, num_docs: usize) -> Result<Self> {
        let term = term.into();
        if postings.is_empty() {
            return Err(Error::InvalidPostings(format!("term {term:?} has no postings")));
        }
        postings.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        let mut unique: Vec<Posting> = Vec::with_capacity(postings.len());
        for p in postings {
            match unique.last_mut() {
                Some(last) if last.doc_id == p.doc_id => last.payload.merge(p.payload),
                _ => unique.push(p),
            }
        }
        let cf = unique.iter().map(|p| p.tf() as u64).sum();
        Ok(Self { idf: idf(num_docs, unique.len()), term, cf, postings: unique })
    }

    /// Parse `term \t df idf cf \t [[docID, payload], ...]`.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut parts = line.splitn(3, '\t');
        let (term, stats, postings) = match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(s), Some(p)) => (t, s, p),
            _ => return Err("expected three tab-separated fields".to_string()),
        };
        let stats: Vec<&str> = stats.split_whitespace().collect();
        let [df, idf, cf] = stats.as_slice() else {
            return Err(format!("expected `df idf cf`, got {stats:?}"));
        };
        let df: usize = df.parse().map_err(|e| format!("df: {e}"))?;
        let idf: f64 = idf.parse().map_err(|e| format!("idf: {e}"))?;
        let cf: u64 = cf.parse().map_err(|e| format!("cf: {e}"))?;
        let postings: Vec<Posting> = serde_json::from_str(postings.trim_end()).map_err(|e| e.to_string())?;
        if postings.is_empty() || postings.len() != df {
            return Err(format!("df {df} does not match {} postings", postings.len()));
        }
        Ok(Self { term: term.to_string(), idf, cf, postings })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn df(&self) -> usize {
        self.postings.len()
    }

    pub fn idf(&self) -> f64 {
        self.idf
    }

    pub fn cf(&self) -> u64 {
        self.cf
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    pub fn posting(&self, doc_id: &str) -> Option<&Posting> {
        self.postings
            .binary_search_by(|p| p.doc_id.as_str().cmp(doc_id))
            .ok()
            .map(|idx| &self.postings[idx])
    }
}

impl fmt::Display for TermEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let postings = serde_json::to_string(&self.postings).map_err(|_| fmt::Error)?;
        write!(f, "{}\t{} {} {}\t{}", self.term, self.df(), self.idf, self.cf, postings)
    }
}

/// Per-document totals for one index variant.
#[derive(Debug, Clone, PartialEq)]
pub struct DocLength {
    pub doc_id: DocId,
    /// Sum of term frequencies.
    pub tf: u64,
    /// Sum of squared tf·idf, for cosine normalization.
    pub sum_sq_tfidf: f64,
}

impl fmt::Display for DocLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.doc_id, self.tf, self.sum_sq_tfidf)
    }
}

/// Document length records in corpus order.
#[derive(Debug, Clone, Default)]
pub struct DocLengthTable {
    rows: Vec<DocLength>,
    slots: HashMap<DocId, usize>,
}

impl DocLengthTable {
    /// A zeroed row for every document, so that documents without terms still
    /// count toward `N`.
    pub fn seeded<I: IntoIterator<Item = DocId>>(doc_ids: I) -> Self {
        let mut table = Self::default();
        for doc_id in doc_ids {
            table.row_mut(&doc_id);
        }
        table
    }

    fn row_mut(&mut self, doc_id: &str) -> &mut DocLength {
        let idx = match self.slots.get(doc_id) {
            Some(&idx) => idx,
            None => {
                self.rows.push(DocLength { doc_id: doc_id.to_string(), tf: 0, sum_sq_tfidf: 0.0 });
                self.slots.insert(doc_id.to_string(), self.rows.len() - 1);
                self.rows.len() - 1
            }
        };
        &mut self.rows[idx]
    }

    pub fn add(&mut self, doc_id: &str, tf: u32, idf: f64) {
        let row = self.row_mut(doc_id);
        row.tf += tf as u64;
        let weight = tf as f64 * idf;
        row.sum_sq_tfidf += weight * weight;
    }

    pub fn get(&self, doc_id: &str) -> Option<&DocLength> {
        self.slots.get(doc_id).map(|&idx| &self.rows[idx])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocLength> {
        self.rows.iter()
    }

    /// Total number of terms in the collection (`C`).
    pub fn total_tf(&self) -> u64 {
        self.rows.iter().map(|r| r.tf).sum()
    }

    pub fn avg_len(&self) -> f64 {
        if self.rows.is_empty() {
            0.0
        } else {
            self.total_tf() as f64 / self.rows.len() as f64
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut out = create_text(path)?;
        for row in &self.rows {
            writeln!(out, "{row}")?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = open_text(path, "document length table")?;
        let mut table = Self::default();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let malformed = |reason: String| Error::Malformed {
                what: "document length",
                path: path.to_path_buf(),
                line: n + 1,
                reason,
            };
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [doc_id, tf, sum] = fields.as_slice() else {
                return Err(malformed(format!("expected `docID tf tf_idf`, got {line:?}")));
            };
            let tf: u64 = tf.parse().map_err(|e| malformed(format!("tf: {e}")))?;
            let sum: f64 = sum.parse().map_err(|e| malformed(format!("tf_idf: {e}")))?;
            let row = table.row_mut(doc_id);
            row.tf = tf;
            row.sum_sq_tfidf = sum;
        }
        Ok(table)
    }
}

/// Counts reported once an index has been written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub num_docs: usize,
    pub num_terms: usize,
    pub num_filtered_terms: Option<usize>,
}

/// Writes term entries, in order, to the index file, the lexicon, and (for
/// the phrase variant) the `df > 1` filtered file, keeping doc lengths.
pub struct IndexWriter {
    paths: IndexPaths,
    index_type: IndexType,
    num_docs: usize,
    index: BufWriter<File>,
    lexicon: BufWriter<File>,
    filtered: Option<BufWriter<File>>,
    doc_lengths: DocLengthTable,
    filtered_doc_lengths: DocLengthTable,
    num_terms: usize,
    num_filtered_terms: usize,
}

impl IndexWriter {
    pub fn create(paths: &IndexPaths, index_type: IndexType, doc_ids: &[DocId]) -> Result<Self> {
        let filtered = match index_type {
            IndexType::Phrase => Some(create_text(&paths.index_file(PHRASE_FILTERED))?),
            _ => None,
        };
        let doc_lengths = DocLengthTable::seeded(doc_ids.iter().cloned());
        Ok(Self {
            paths: paths.clone(),
            index_type,
            num_docs: doc_lengths.len(),
            index: create_text(&paths.index_file(index_type.as_str()))?,
            lexicon: create_text(&paths.lexicon())?,
            filtered,
            filtered_doc_lengths: doc_lengths.clone(),
            doc_lengths,
            num_terms: 0,
            num_filtered_terms: 0,
        })
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    pub fn write(&mut self, entry: &TermEntry) -> Result<()> {
        writeln!(self.index, "{entry}")?;
        writeln!(self.lexicon, "{}", entry.term())?;
        for p in entry.postings() {
            self.doc_lengths.add(&p.doc_id, p.tf(), entry.idf());
        }
        self.num_terms += 1;

        if let Some(filtered) = self.filtered.as_mut() {
            if entry.df() > 1 {
                writeln!(filtered, "{entry}")?;
                for p in entry.postings() {
                    self.filtered_doc_lengths.add(&p.doc_id, p.tf(), entry.idf());
                }
                self.num_filtered_terms += 1;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<IndexStats> {
        self.index.flush()?;
        self.lexicon.flush()?;
        self.doc_lengths.write(&self.paths.doc_length_file(self.index_type.as_str()))?;
        let num_filtered_terms = match self.filtered.as_mut() {
            Some(filtered) => {
                filtered.flush()?;
                self.filtered_doc_lengths.write(&self.paths.doc_length_file(PHRASE_FILTERED))?;
                Some(self.num_filtered_terms)
            }
            None => None,
        };
        Ok(IndexStats { num_docs: self.num_docs, num_terms: self.num_terms, num_filtered_terms })
    }
}

/// Groups triples by term into term entries. Under a memory limit the working
/// set is capped: once full, every term except the lexicographically last one
/// (whose postings may still be arriving) is written out and dropped.
pub struct IndexBuilder {
    working: BTreeMap<String, Vec<Posting>>,
    cap: Option<usize>,
    writer: IndexWriter,
    evictions: usize,
}

impl IndexBuilder {
    pub fn new(writer: IndexWriter, memory: MemoryLimit) -> Self {
        Self { working: BTreeMap::new(), cap: memory.cap(), writer, evictions: 0 }
    }

    pub fn push(&mut self, triple: Triple) -> Result<()> {
        self.working
            .entry(triple.term)
            .or_default()
            .push(Posting::new(triple.doc_id, triple.payload));
        if matches!(self.cap, Some(cap) if self.working.len() >= cap) {
            self.evict()?;
        }
        Ok(())
    }

    fn evict(&mut self) -> Result<()> {
        let Some(last) = self.working.keys().next_back().cloned() else {
            return Ok(());
        };
        let retained = self.working.split_off(&last);
        let complete = std::mem::replace(&mut self.working, retained);
        self.evictions += 1;
        for (term, postings) in complete {
            self.write_term(term, postings)?;
        }
        Ok(())
    }

    fn write_term(&mut self, term: String, postings: Vec<Posting>) -> Result<()> {
        let entry = TermEntry::new(term, postings, self.writer.num_docs())?;
        self.writer.write(&entry)
    }

    pub fn finish(mut self) -> Result<IndexStats> {
        let remaining = std::mem::take(&mut self.working);
        for (term, postings) in remaining {
            self.write_term(term, postings)?;
        }
        tracing::debug!(evictions = self.evictions, "index builder drained");
        self.writer.finish()
    }
}

/// A finalized index variant loaded for querying. Read-only.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    terms: HashMap<String, TermEntry>,
    doc_lengths: DocLengthTable,
}

impl InvertedIndex {
    pub fn new(entries: Vec<TermEntry>, doc_lengths: DocLengthTable) -> Self {
        let terms = entries.into_iter().map(|e| (e.term.clone(), e)).collect();
        Self { terms, doc_lengths }
    }

    /// Load `indexes/<name>.txt` and `indexes/<name>-docLength.txt`.
    pub fn load(paths: &IndexPaths, name: &str) -> Result<Self> {
        let entries = load_term_entries(&paths.index_file(name))?;
        let doc_lengths = DocLengthTable::load(&paths.doc_length_file(name))?;
        tracing::info!(index = name, terms = entries.len(), docs = doc_lengths.len(), "loaded index");
        Ok(Self::new(entries, doc_lengths))
    }

    pub fn get(&self, term: &str) -> Option<&TermEntry> {
        self.terms.get(term)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn doc_lengths(&self) -> &DocLengthTable {
        &self.doc_lengths
    }

    /// `N`.
    pub fn num_docs(&self) -> usize {
        self.doc_lengths.len()
    }

    /// `C`, the total term count.
    pub fn total_terms(&self) -> u64 {
        self.doc_lengths.total_tf()
    }

    pub fn avg_doc_len(&self) -> f64 {
        self.doc_lengths.avg_len()
    }
}
