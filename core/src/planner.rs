use crate::config::IndexType;
use crate::index::InvertedIndex;
use crate::persist::{IndexPaths, PHRASE_FILTERED};
use crate::phrase::{confirm, query_phrases};
use crate::scoring::{score_query, RetrievalModel, ScoreBoard, MAX_RESULTS};
use crate::tokenizer::{Normalizer, StopWords};
use crate::Result;
use std::collections::HashSet;

/// How a query was answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanTrace {
    pub phrases: usize,
    /// Phrases found in the filtered phrase index.
    pub filtered_hits: usize,
    /// Documents confirming a phrase by proximity, summed over phrases.
    pub confirmations: usize,
    pub single_fallback: bool,
}

/// Tiered BM25 over the filtered phrase, positional and single indexes.
pub struct QueryPlanner {
    filtered: InvertedIndex,
    positional: InvertedIndex,
    single: InvertedIndex,
    stop_words: StopWords,
}

impl QueryPlanner {
    pub fn new(filtered: InvertedIndex, positional: InvertedIndex, single: InvertedIndex, stop_words: StopWords) -> Self {
        Self { filtered, positional, single, stop_words }
    }

    pub fn load(paths: &IndexPaths, stop_words: StopWords) -> Result<Self> {
        Ok(Self::new(
            InvertedIndex::load(paths, PHRASE_FILTERED)?,
            InvertedIndex::load(paths, IndexType::Positional.as_str())?,
            InvertedIndex::load(paths, IndexType::Single.as_str())?,
            stop_words,
        ))
    }

    /// Every distinct term once, weighted 1.
    fn unit_terms<I: IntoIterator<Item = String>>(terms: I) -> Vec<(String, u32)> {
        let mut seen = HashSet::new();
        terms.into_iter().filter(|t| seen.insert(t.clone())).map(|t| (t, 1)).collect()
    }

    pub fn plan(&self, query: &str) -> (ScoreBoard, PlanTrace) {
        let mut scores = ScoreBoard::new();
        let phrases = query_phrases(query, &self.stop_words);
        let mut trace = PlanTrace { phrases: phrases.len(), ..PlanTrace::default() };
        let positional = Normalizer::new(IndexType::Positional, &self.stop_words);

        for phrase in phrases {
            let phrase_scores = if self.filtered.contains(&phrase) {
                trace.filtered_hits += 1;
                score_query(&self.filtered, &[(phrase.clone(), 1)], RetrievalModel::Bm25)
            } else {
                let words: Option<Vec<String>> = phrase.split(' ').map(|w| positional.fold_word(w)).collect();
                let Some(words) = words else {
                    continue;
                };
                let confirmed = confirm(&self.positional, &words);
                trace.confirmations += confirmed;
                if confirmed == 0 {
                    continue;
                }
                score_query(&self.positional, &Self::unit_terms(words), RetrievalModel::Bm25)
            };
            tracing::debug!(%phrase, docs = phrase_scores.len(), "phrase tier");
            for (doc_id, score) in phrase_scores.iter() {
                scores.add(doc_id, score);
            }
        }

        if scores.len() < MAX_RESULTS || trace.confirmations == 0 {
            trace.single_fallback = true;
            let single = Normalizer::new(IndexType::Single, &self.stop_words);
            let terms = Self::unit_terms(single.query_terms(query).terms());
            let single_scores = score_query(&self.single, &terms, RetrievalModel::Bm25);
            tracing::debug!(docs = single_scores.len(), "single-term tier");
            scores.blend(&single_scores);
        }
        (scores, trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::Payload;
    use crate::index::{DocLengthTable, Posting, TermEntry};

    fn build(entries: Vec<(&str, Vec<(&str, Payload)>)>, docs: &[&str]) -> InvertedIndex {
        let n = docs.len();
        let entries: Vec<TermEntry> = entries
            .into_iter()
            .map(|(t, ps)| TermEntry::new(t, ps.into_iter().map(|(d, p)| Posting::new(d, p)).collect(), n).unwrap())
            .collect();
        let mut lengths = DocLengthTable::seeded(docs.iter().map(|d| d.to_string()));
        for e in &entries {
            for p in e.postings() {
                lengths.add(&p.doc_id, p.tf(), e.idf());
            }
        }
        InvertedIndex::new(entries, lengths)
    }

    fn pos(positions: &[u32]) -> Payload {
        Payload::Positions { tf: positions.len() as u32, positions: positions.to_vec() }
    }

    fn planner() -> QueryPlanner {
        let docs = ["D1", "D2", "D3", "D4"];
        let filtered = build(vec![("nuclear weapons", vec![("D1", Payload::Frequency(1)), ("D2", Payload::Frequency(2))])], &docs);
        let positional = build(
            vec![
                ("rail", vec![("D3", pos(&[4])), ("D4", pos(&[1]))]),
                ("strike", vec![("D3", pos(&[6])), ("D4", pos(&[90]))]),
            ],
            &docs,
        );
        let single = build(
            vec![
                ("rail", vec![("D3", Payload::Frequency(1)), ("D4", Payload::Frequency(1))]),
                ("strike", vec![("D3", Payload::Frequency(1)), ("D4", Payload::Frequency(1))]),
                ("weapons", vec![("D2", Payload::Frequency(1))]),
            ],
            &docs,
        );
        QueryPlanner::new(filtered, positional, single, StopWords::english())
    }

    #[test]
    fn filtered_phrase_tier_then_single_blend() {
        let (scores, trace) = planner().plan("nuclear weapons");
        assert_eq!(trace.filtered_hits, 1);
        assert!(trace.single_fallback);
        let docs: Vec<_> = scores.iter().map(|(d, _)| d).collect();
        assert_eq!(docs, vec!["D1", "D2"]);
    }

    #[test]
    fn positional_tier_requires_proximity() {
        let (scores, trace) = planner().plan("rail strike");
        assert_eq!(trace.filtered_hits, 0);
        assert_eq!(trace.confirmations, 1);
        // Fewer than 100 documents, so single-term results are blended in.
        assert!(trace.single_fallback);
        assert!(scores.get("D3").is_some());
        assert!(scores.get("D4").is_some());
    }

    #[test]
    fn query_without_phrases_uses_single_index() {
        let (scores, trace) = planner().plan("weapons");
        assert_eq!(trace.phrases, 0);
        assert!(trace.single_fallback);
        assert_eq!(scores.iter().map(|(d, _)| d).collect::<Vec<_>>(), vec!["D2"]);
    }
}
