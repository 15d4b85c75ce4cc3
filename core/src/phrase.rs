//! Two- and three-word phrases: n-gram extraction for the phrase index and
//! positional proximity confirmation at query time.

use crate::accumulator::Accumulator;
use crate::index::{InvertedIndex, Posting};
use crate::tokenizer::{replace_escapes, StopWords};
use crate::DocId;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// Positions must fall within this distance of the reference position.
pub const PROXIMITY_HALF_WINDOW: i64 = 15;

const CARRY_TOKENS: usize = 2;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+(?:[-'.]\w+)*|[^\w\s]+").expect("valid regex");
    static ref SYMBOLS: HashSet<&'static str> = [
        ",", "(", ")", ".", "?", "!", "'", ";", "...", ":", "-", "@", "$", "^", "*", "/", "○",
        "•", "``", "''", "&", "[", "]", "%", "#",
    ]
    .into_iter()
    .collect();
}

/// Split a line into lowercase words and punctuation runs.
pub fn word_tokens(line: &str) -> Vec<String> {
    WORD.find_iter(line)
        .map(|m| m.as_str().nfkc().collect::<String>().to_lowercase())
        .collect()
}

/// A token may take part in a phrase if it is neither a stop word nor a symbol.
pub fn is_admissible(token: &str, stops: &StopWords) -> bool {
    !stops.contains(token) && !SYMBOLS.contains(token) && token.chars().any(char::is_alphanumeric)
}

/// Emit every run of 2 or 3 admissible tokens, ordered by start position.
/// Runs ending before `first_new` are skipped (they were emitted already).
fn ngrams<F: FnMut(String)>(tokens: &[String], stops: &StopWords, first_new: usize, mut emit: F) {
    let admissible: Vec<bool> = tokens.iter().map(|t| is_admissible(t, stops)).collect();
    for start in 0..tokens.len() {
        for len in 2..=3 {
            let end = start + len;
            if end > tokens.len() || end - 1 < first_new {
                continue;
            }
            if admissible[start..end].iter().all(|&a| a) {
                emit(tokens[start..end].join(" "));
            }
        }
    }
}

/// Record the phrases of one document line into `acc`. Trailing admissible
/// tokens are carried so that phrases broken across lines are still found.
pub fn extract_line(line: &str, stops: &StopWords, acc: &mut Accumulator) {
    let tokens = word_tokens(line);
    if tokens.is_empty() {
        return;
    }
    let mut window = std::mem::take(&mut acc.carry);
    let first_new = window.len();
    window.extend(tokens);

    let mut phrases = Vec::new();
    ngrams(&window, stops, first_new, |p| phrases.push(p));
    for p in &phrases {
        acc.record(p);
    }

    let trailing = window.iter().rev().take_while(|t| is_admissible(t, stops)).count().min(CARRY_TOKENS);
    acc.carry = window.split_off(window.len() - trailing);
}

/// Candidate phrases of a query, in query order, without repeats.
pub fn query_phrases(query: &str, stops: &StopWords) -> Vec<String> {
    let tokens = word_tokens(&replace_escapes(query));
    let mut seen = HashSet::new();
    let mut phrases = Vec::new();
    ngrams(&tokens, stops, 0, |p| {
        if seen.insert(p.clone()) {
            phrases.push(p);
        }
    });
    phrases
}

/// True if one pointer per list can be placed so that every pointed position
/// lies in `[m - 15, m + 15)` where `m` is the largest of them. Pointers only
/// move forward.
pub fn within_window(lists: &[&[u32]]) -> bool {
    if lists.is_empty() || lists.iter().any(|l| l.is_empty()) {
        return false;
    }
    let mut ptrs = vec![0usize; lists.len()];
    loop {
        let reference = lists
            .iter()
            .zip(&ptrs)
            .map(|(list, &p)| list[p] as i64)
            .max()
            .unwrap_or_default();
        let lower = reference - PROXIMITY_HALF_WINDOW;
        let upper = reference + PROXIMITY_HALF_WINDOW;

        for (list, ptr) in lists.iter().zip(ptrs.iter_mut()) {
            while *ptr < list.len() && (list[*ptr] as i64) < lower {
                *ptr += 1;
            }
            if *ptr == list.len() {
                return false;
            }
        }

        let all_inside = lists.iter().zip(&ptrs).all(|(list, &p)| {
            let pos = list[p] as i64;
            pos >= lower && pos < upper
        });
        if all_inside {
            return true;
        }
    }
}

/// Documents present in every posting list, with each list's positions for
/// that document. Lists must be sorted by document id.
pub fn intersect<'a>(lists: &[&'a [Posting]]) -> Vec<(&'a DocId, Vec<&'a [u32]>)> {
    let Some((&first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    let mut common = Vec::new();
    'docs: for posting in first {
        let mut positions = vec![posting.payload.positions()];
        for &list in rest {
            match list.binary_search_by(|p| p.doc_id.cmp(&posting.doc_id)) {
                Ok(idx) => positions.push(list[idx].payload.positions()),
                Err(_) => continue 'docs,
            }
        }
        common.push((&posting.doc_id, positions));
    }
    common
}

/// Number of documents in which `terms` occur within the proximity window.
/// Zero when any term is missing from the positional index.
pub fn confirm(index: &InvertedIndex, terms: &[String]) -> usize {
    let mut lists = Vec::with_capacity(terms.len());
    for term in terms {
        match index.get(term) {
            Some(entry) => lists.push(entry.postings()),
            None => return 0,
        }
    }
    intersect(&lists).into_iter().filter(|(_, positions)| within_window(positions)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases_of(lines: &[&str]) -> Vec<String> {
        let stops = StopWords::english();
        let mut acc = Accumulator::new(false);
        for line in lines {
            extract_line(line, &stops, &mut acc);
        }
        acc.terms()
    }

    #[test]
    fn proximity_window() {
        assert!(within_window(&[&[5, 40], &[10, 45]]));
        assert!(!within_window(&[&[5], &[100]]));
        assert!(within_window(&[&[5, 200], &[190]]));
        assert!(!within_window(&[&[1, 2, 3], &[]]));
    }

    #[test]
    fn two_and_three_word_runs() {
        let phrases = phrases_of(&["New York City council"]);
        assert_eq!(
            phrases,
            vec!["new york", "new york city", "york city", "york city council", "city council"]
        );
    }

    #[test]
    fn stop_words_and_symbols_break_runs() {
        let phrases = phrases_of(&["bank of america, inc"]);
        assert!(phrases.is_empty());
        assert_eq!(phrases_of(&["the new york"]), vec!["new york"]);
    }

    #[test]
    fn phrases_span_line_breaks() {
        let phrases = phrases_of(&["flights to new", "york city"]);
        assert_eq!(phrases, vec!["new york", "new york city", "york city"]);
    }

    #[test]
    fn query_phrases_in_order_without_repeats() {
        let stops = StopWords::english();
        let phrases = query_phrases("Rail strike, rail strike in France", &stops);
        assert_eq!(phrases, vec!["rail strike"]);
        let phrases = query_phrases("rail strike France rail strike", &stops);
        assert_eq!(
            phrases,
            vec!["rail strike", "rail strike france", "strike france", "strike france rail", "france rail", "france rail strike"]
        );
    }
}
