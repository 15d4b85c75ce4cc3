use crate::config::IndexType;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Per-document payload of a posting: a plain frequency, or the frequency
/// plus the token positions for the positional index.
///
/// Serialized as `3` or `[3,5,9,12]` (frequency first, then positions).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawPayload", into = "RawPayload")]
pub enum Payload {
    Frequency(u32),
    Positions { tf: u32, positions: Vec<u32> },
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Frequency(u32),
    List(Vec<u32>),
}

impl From<Payload> for RawPayload {
    fn from(p: Payload) -> Self {
        match p {
            Payload::Frequency(tf) => RawPayload::Frequency(tf),
            Payload::Positions { tf, positions } => {
                let mut list = Vec::with_capacity(positions.len() + 1);
                list.push(tf);
                list.extend(positions);
                RawPayload::List(list)
            }
        }
    }
}

impl TryFrom<RawPayload> for Payload {
    type Error = String;

    fn try_from(raw: RawPayload) -> Result<Self, Self::Error> {
        match raw {
            RawPayload::Frequency(tf) => Ok(Payload::Frequency(tf)),
            RawPayload::List(list) => match list.split_first() {
                Some((tf, positions)) => Ok(Payload::Positions { tf: *tf, positions: positions.to_vec() }),
                None => Err("empty positional payload".to_string()),
            },
        }
    }
}

impl Payload {
    pub fn tf(&self) -> u32 {
        match self {
            Payload::Frequency(tf) => *tf,
            Payload::Positions { tf, .. } => *tf,
        }
    }

    pub fn positions(&self) -> &[u32] {
        match self {
            Payload::Frequency(_) => &[],
            Payload::Positions { positions, .. } => positions,
        }
    }

    /// Fold another posting for the same (term, document) into this one.
    pub fn merge(&mut self, other: Payload) {
        match (self, other) {
            (Payload::Positions { tf, positions }, Payload::Positions { tf: tf2, positions: p2 }) => {
                *tf += tf2;
                positions.extend(p2);
                positions.sort_unstable();
            }
            (this, other) => {
                let tf = this.tf() + other.tf();
                match this {
                    Payload::Frequency(f) => *f = tf,
                    Payload::Positions { tf: t, .. } => *t = tf,
                }
            }
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Frequency(tf) => write!(f, "{tf}"),
            Payload::Positions { tf, positions } => {
                write!(f, "[{tf}")?;
                for p in positions {
                    write!(f, ",{p}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// `term \t docID \t payload`, the unit passed from accumulation to the index
/// builder. Ordered by term, then document, then payload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Triple {
    pub term: String,
    pub doc_id: DocId,
    pub payload: Payload,
}

impl Triple {
    pub fn new(term: impl Into<String>, doc_id: impl Into<DocId>, payload: Payload) -> Self {
        Self { term: term.into(), doc_id: doc_id.into(), payload }
    }

    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.splitn(3, '\t');
        let (term, doc_id, payload) = match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(d), Some(p)) if !t.is_empty() && !d.is_empty() => (t, d, p),
            _ => return Err(format!("expected term\\tdocID\\tpayload, got {line:?}")),
        };
        let payload: Payload = serde_json::from_str(payload.trim_end()).map_err(|e| e.to_string())?;
        Ok(Triple::new(term, doc_id, payload))
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.term, self.doc_id, self.payload)
    }
}

/// Term counts for one document (or one query), in first-seen term order.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    track_positions: bool,
    slots: HashMap<String, usize>,
    entries: Vec<(String, Payload)>,
    position: u32,
    /// Trailing admissible tokens of the previous line, for phrase extraction.
    pub(crate) carry: Vec<String>,
}

impl Accumulator {
    pub fn new(track_positions: bool) -> Self {
        Self { track_positions, ..Self::default() }
    }

    pub fn for_index(index_type: IndexType) -> Self {
        Self::new(index_type.tracks_positions())
    }

    /// Record a generic token; in positional mode it takes the next position.
    pub fn record(&mut self, term: &str) {
        if self.track_positions {
            self.position += 1;
            let position = self.position;
            self.bump(term, Some(position));
        } else {
            self.bump(term, None);
        }
    }

    /// Record a synthesized token. Never consumes a position.
    pub fn record_special(&mut self, term: &str) {
        self.bump(term, None);
    }

    fn bump(&mut self, term: &str, position: Option<u32>) {
        let idx = match self.slots.get(term) {
            Some(&idx) => idx,
            None => {
                let empty = if self.track_positions {
                    Payload::Positions { tf: 0, positions: Vec::new() }
                } else {
                    Payload::Frequency(0)
                };
                self.entries.push((term.to_string(), empty));
                self.slots.insert(term.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        match &mut self.entries[idx].1 {
            Payload::Frequency(tf) => *tf += 1,
            Payload::Positions { tf, positions } => {
                *tf += 1;
                if let Some(p) = position {
                    positions.push(p);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<&Payload> {
        self.slots.get(term).map(|&idx| &self.entries[idx].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Payload)> {
        self.entries.iter().map(|(t, p)| (t.as_str(), p))
    }

    /// Terms in first-seen order.
    pub fn terms(&self) -> Vec<String> {
        self.entries.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn term_frequencies(&self) -> Vec<(String, u32)> {
        self.entries.iter().map(|(t, p)| (t.clone(), p.tf())).collect()
    }

    pub fn total_tf(&self) -> u64 {
        self.entries.iter().map(|(_, p)| p.tf() as u64).sum()
    }

    /// Drain into triples for `doc_id`, in first-seen term order.
    pub fn into_triples(self, doc_id: &str) -> Vec<Triple> {
        self.entries.into_iter().map(|(term, payload)| Triple::new(term, doc_id, payload)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_in_first_seen_order() {
        let mut acc = Accumulator::new(false);
        for t in ["rust", "index", "rust"] {
            acc.record(t);
        }
        assert_eq!(acc.term_frequencies(), vec![("rust".to_string(), 2), ("index".to_string(), 1)]);
        assert_eq!(acc.total_tf(), 3);
    }

    #[test]
    fn positional_mode_tracks_positions_but_not_for_specials() {
        let mut acc = Accumulator::new(true);
        acc.record("new");
        acc.record("york");
        acc.record_special("01-05-2004");
        acc.record("new");
        assert_eq!(acc.get("new"), Some(&Payload::Positions { tf: 2, positions: vec![1, 3] }));
        assert_eq!(acc.get("01-05-2004"), Some(&Payload::Positions { tf: 1, positions: vec![] }));
    }

    #[test]
    fn triple_line_format() {
        let t = Triple::new("york", "FR-1", Payload::Positions { tf: 2, positions: vec![4, 9] });
        let line = t.to_string();
        assert_eq!(line, "york\tFR-1\t[2,4,9]");
        assert_eq!(Triple::parse(&line).unwrap(), t);
        assert_eq!(Triple::parse("new york\tD2\t3").unwrap().payload, Payload::Frequency(3));
        assert!(Triple::parse("broken line").is_err());
        assert!(Triple::parse("x\tD\t[]").is_err());
    }

    #[test]
    fn triples_order_by_term_then_document() {
        let mut v = vec![
            Triple::new("b", "D1", Payload::Frequency(1)),
            Triple::new("a", "D2", Payload::Frequency(1)),
            Triple::new("a", "D1", Payload::Frequency(5)),
        ];
        v.sort();
        let keys: Vec<_> = v.iter().map(|t| (t.term.as_str(), t.doc_id.as_str())).collect();
        assert_eq!(keys, vec![("a", "D1"), ("a", "D2"), ("b", "D1")]);
    }

    #[test]
    fn merge_folds_duplicate_postings() {
        let mut p = Payload::Positions { tf: 1, positions: vec![7] };
        p.merge(Payload::Positions { tf: 2, positions: vec![2, 9] });
        assert_eq!(p, Payload::Positions { tf: 3, positions: vec![2, 7, 9] });
        let mut f = Payload::Frequency(2);
        f.merge(Payload::Frequency(3));
        assert_eq!(f.tf(), 5);
    }
}
