//! Ranked retrieval over a loaded index: BM25, Dirichlet-smoothed query
//! likelihood, and tf·idf cosine.

use crate::index::InvertedIndex;
use crate::{DocId, Error};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub const K1: f64 = 1.2;
pub const K2: f64 = 700.0;
pub const B: f64 = 0.75;

/// Results kept per query.
pub const MAX_RESULTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalModel {
    Cosine,
    Bm25,
    Lm,
}

impl RetrievalModel {
    /// Tag written in the last column of a results line.
    pub fn label(&self) -> &'static str {
        match self {
            RetrievalModel::Cosine => "COSINE",
            RetrievalModel::Bm25 => "BM25",
            RetrievalModel::Lm => "LM",
        }
    }
}

impl fmt::Display for RetrievalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RetrievalModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(RetrievalModel::Cosine),
            "bm25" => Ok(RetrievalModel::Bm25),
            "lm" => Ok(RetrievalModel::Lm),
            _ => Err(Error::UnknownModel(s.to_string())),
        }
    }
}

/// BM25 contribution of one term to one document.
pub fn bm25(n: usize, doc_tf: u32, q_tf: u32, num_docs: usize, doc_len: u64, avg_doc_len: f64) -> f64 {
    if avg_doc_len <= 0.0 {
        return 0.0;
    }
    let (doc_tf, q_tf) = (doc_tf as f64, q_tf as f64);
    let k = K1 * ((1.0 - B) + B * (doc_len as f64 / avg_doc_len));
    let w = ((num_docs as f64 - n as f64 + 0.5) / (n as f64 + 0.5)).ln();
    let doc_part = if k + doc_tf == 0.0 { 0.0 } else { (K1 + 1.0) * doc_tf / (k + doc_tf) };
    let query_part = (K2 + 1.0) * q_tf / (K2 + q_tf);
    w * doc_part * query_part
}

/// Dirichlet-smoothed likelihood of one term in a document of length `d`.
pub fn lm(doc_tf: u32, u: f64, cf: u64, c: u64, d: u64) -> f64 {
    let denominator = d as f64 + u;
    if denominator == 0.0 {
        return 0.0;
    }
    let background = if c == 0 { 0.0 } else { u * (cf as f64 / c as f64) };
    (doc_tf as f64 + background) / denominator
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

/// Document scores in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ScoreBoard {
    order: Vec<DocId>,
    scores: HashMap<DocId, f64>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, doc_id: &str, init: f64) -> (&mut f64, bool) {
        let fresh = !self.scores.contains_key(doc_id);
        if fresh {
            self.order.push(doc_id.to_string());
        }
        (self.scores.entry(doc_id.to_string()).or_insert(init), fresh)
    }

    pub fn add(&mut self, doc_id: &str, score: f64) {
        let (slot, fresh) = self.slot(doc_id, score);
        if !fresh {
            *slot += score;
        }
    }

    pub fn multiply(&mut self, doc_id: &str, score: f64) {
        let (slot, fresh) = self.slot(doc_id, score);
        if !fresh {
            *slot *= score;
        }
    }

    pub fn get(&self, doc_id: &str) -> Option<f64> {
        self.scores.get(doc_id).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.order.iter().map(move |d| (d.as_str(), self.scores[d]))
    }

    fn map_scores<F: FnMut(&str, f64) -> f64>(&mut self, mut f: F) {
        for doc_id in &self.order {
            if let Some(score) = self.scores.get_mut(doc_id) {
                *score = f(doc_id, *score);
            }
        }
    }

    /// Fold `other` into `self`: new documents are appended with their score,
    /// documents present in both get the mean of the two.
    pub fn blend(&mut self, other: &ScoreBoard) {
        for (doc_id, score) in other.iter() {
            match self.scores.get_mut(doc_id) {
                Some(existing) => *existing = (*existing + score) / 2.0,
                None => {
                    self.order.push(doc_id.to_string());
                    self.scores.insert(doc_id.to_string(), score);
                }
            }
        }
    }

    /// Up to `limit` documents by descending score; equal scores keep
    /// first-seen order.
    pub fn ranked(&self, limit: usize) -> Vec<(DocId, f64)> {
        let mut ranked: Vec<(DocId, f64)> = self.iter().map(|(d, s)| (d.to_string(), s)).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        ranked
    }
}

/// Score `terms` (term, query frequency) against `index`. Terms missing from
/// the index contribute nothing.
pub fn score_query(index: &InvertedIndex, terms: &[(String, u32)], model: RetrievalModel) -> ScoreBoard {
    let mut board = ScoreBoard::new();
    let doc_lengths = index.doc_lengths();
    let num_docs = index.num_docs();
    let avg_doc_len = index.avg_doc_len();
    let total_terms = index.total_terms();
    let doc_len = |doc_id: &str| doc_lengths.get(doc_id).map(|d| d.tf).unwrap_or(0);
    let mut query_len = 0.0;

    for (term, q_tf) in terms {
        let Some(entry) = index.get(term) else {
            continue;
        };
        let q_tf = *q_tf;
        match model {
            RetrievalModel::Cosine => {
                let q_weight = q_tf as f64 * entry.idf();
                for p in entry.postings() {
                    board.add(&p.doc_id, p.tf() as f64 * entry.idf() * q_weight);
                }
                query_len += q_weight * q_weight;
            }
            RetrievalModel::Bm25 => {
                for p in entry.postings() {
                    let s = bm25(entry.df(), p.tf(), q_tf, num_docs, doc_len(&p.doc_id), avg_doc_len);
                    board.add(&p.doc_id, s);
                }
            }
            RetrievalModel::Lm => {
                let mut with_term = HashSet::with_capacity(entry.df());
                for p in entry.postings() {
                    board.multiply(&p.doc_id, lm(p.tf(), avg_doc_len, entry.cf(), total_terms, doc_len(&p.doc_id)));
                    with_term.insert(p.doc_id.as_str());
                }
                // One shared value for every document lacking the term, taken
                // at the length of the term's last posting.
                let last_len = entry.postings().last().map(|p| doc_len(&p.doc_id)).unwrap_or(0);
                let absent = lm(0, avg_doc_len, entry.cf(), total_terms, last_len);
                for row in doc_lengths.iter() {
                    if !with_term.contains(row.doc_id.as_str()) {
                        board.multiply(&row.doc_id, absent);
                    }
                }
            }
        }
    }

    if model == RetrievalModel::Cosine {
        board.map_scores(|doc_id, score| {
            let doc_norm = doc_lengths.get(doc_id).map(|d| d.sum_sq_tfidf).unwrap_or(0.0);
            let denominator = (doc_norm * query_len).sqrt();
            if denominator == 0.0 {
                0.0
            } else {
                round_to(score / denominator, 8)
            }
        });
    }
    board
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::Payload;
    use crate::index::{DocLengthTable, Posting, TermEntry};

    fn index() -> InvertedIndex {
        let docs = ["D1", "D2", "D3"].map(String::from);
        let postings = |pairs: &[(&str, u32)]| {
            pairs.iter().map(|(d, tf)| Posting::new(*d, Payload::Frequency(*tf))).collect::<Vec<_>>()
        };
        let entries = vec![
            TermEntry::new("rail", postings(&[("D1", 2), ("D3", 1)]), 3).unwrap(),
            TermEntry::new("strike", postings(&[("D1", 1), ("D2", 3)]), 3).unwrap(),
        ];
        let mut lengths = DocLengthTable::seeded(docs);
        for e in &entries {
            for p in e.postings() {
                lengths.add(&p.doc_id, p.tf(), e.idf());
            }
        }
        InvertedIndex::new(entries, lengths)
    }

    fn terms(words: &[&str]) -> Vec<(String, u32)> {
        words.iter().map(|w| (w.to_string(), 1)).collect()
    }

    #[test]
    fn bm25_closed_form() {
        assert_eq!(bm25(1, 1, 1, 2, 10, 10.0), 0.0);
        let k = K1 * ((1.0 - B) + B * (5.0 / 10.0));
        let expected = (9.5f64 / 1.5).ln() * ((K1 + 1.0) * 2.0 / (k + 2.0)) * ((K2 + 1.0) / (K2 + 1.0));
        assert!((bm25(1, 2, 1, 10, 5, 10.0) - expected).abs() < 1e-12);
        assert_eq!(bm25(1, 1, 1, 2, 10, 0.0), 0.0);
    }

    #[test]
    fn lm_formula_and_zero_denominator() {
        assert!((lm(2, 4.0, 3, 12, 6) - (2.0 + 1.0) / 10.0).abs() < 1e-12);
        assert_eq!(lm(1, 0.0, 1, 1, 0), 0.0);
    }

    #[test]
    fn model_names() {
        assert_eq!("BM25".parse::<RetrievalModel>().unwrap(), RetrievalModel::Bm25);
        assert_eq!(RetrievalModel::Lm.label(), "LM");
        assert!(matches!("tfidf".parse::<RetrievalModel>(), Err(Error::UnknownModel(_))));
    }

    #[test]
    fn ranking_is_stable_for_ties() {
        let mut board = ScoreBoard::new();
        board.add("D9", 1.0);
        board.add("D2", 3.0);
        board.add("D5", 1.0);
        board.add("D9", 0.5);
        let ranked: Vec<_> = board.ranked(10).into_iter().map(|(d, _)| d).collect();
        assert_eq!(ranked, vec!["D2", "D9", "D5"]);
        assert_eq!(board.ranked(1).len(), 1);
    }

    #[test]
    fn blend_averages_shared_documents() {
        let mut phrase = ScoreBoard::new();
        phrase.add("D1", 4.0);
        let mut single = ScoreBoard::new();
        single.add("D2", 1.0);
        single.add("D1", 2.0);
        phrase.blend(&single);
        assert_eq!(phrase.iter().collect::<Vec<_>>(), vec![("D1", 3.0), ("D2", 1.0)]);
    }

    #[test]
    fn lm_scores_every_document() {
        let index = index();
        let board = score_query(&index, &terms(&["rail"]), RetrievalModel::Lm);
        assert_eq!(board.len(), 3);
        let docs: Vec<_> = board.iter().map(|(d, _)| d).collect();
        assert_eq!(docs, vec!["D1", "D3", "D2"]);
        let d2 = board.get("D2").unwrap();
        let u = index.avg_doc_len();
        // D3 (the last posting) has length 1.
        assert!((d2 - lm(0, u, 3, 7, 1)).abs() < 1e-12);
    }

    #[test]
    fn cosine_is_normalized_and_unknown_terms_ignored() {
        let index = index();
        let board = score_query(&index, &terms(&["rail", "zeppelin"]), RetrievalModel::Cosine);
        // Single-term query against documents holding only that term scores 1.
        assert_eq!(board.get("D3"), Some(1.0));
        assert!(board.get("D1").unwrap() < 1.0);
        assert!(score_query(&index, &terms(&["zeppelin"]), RetrievalModel::Bm25).is_empty());
    }
}
