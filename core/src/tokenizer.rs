use crate::accumulator::Accumulator;
use crate::config::IndexType;
use crate::phrase;
use crate::{Error, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

/// Python-compatible `string.punctuation`, stripped from both ends of tokens.
const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
    "be","because","been","before","being","below","between","both","but","by",
    "can","can't","cannot","could","couldn't",
    "did","didn't","do","does","doesn't","doing","don't","down","during",
    "each","few","for","from","further",
    "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
    "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
    "let's","me","more","most","mustn't","my","myself",
    "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
    "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
    "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
    "under","until","up","very",
    "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
    "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves",
];

lazy_static! {
    static ref ESCAPE: Regex = Regex::new(r"&[a-z]+;").expect("valid regex");
    static ref EMAIL: Regex = Regex::new(r"[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9.-]+").expect("valid regex");
    static ref IP: Regex = Regex::new(r"\b(?:\d{2,3}\.){3}\d{2,3}\b").expect("valid regex");
    static ref ABBREV: Regex = Regex::new(r"\b[A-Z][a-zA-Z.]?[A-Z]\b\.?").expect("valid regex");
    static ref DATE: Regex = Regex::new(
        r"(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sept|Oct|Nov|Dec\.?|January|February|March|April|May|June|July|August|September|October|November|December)\s(\d+),\s(\d+)|(\d+)[/-](\d+)[/-](\d+)"
    ).expect("valid regex");
    static ref DECIMAL: Regex = Regex::new(r"([§$]*)(\d+\.\d+)").expect("valid regex");
    static ref HYPHEN: Regex = Regex::new(r"\w+(?:-\w+)+").expect("valid regex");
    static ref URL: Regex = Regex::new(
        r"https?://(?:[a-zA-Z]|[0-9]|[\x24-\x5F@.&+]|[!*(),]|%[0-9a-fA-F][0-9a-fA-F])+"
    ).expect("valid regex");
    static ref FILE_EXT: Regex = Regex::new(r"\w*\.(?i:jpg|gif|doc|pdf|html)").expect("valid regex");
    static ref SPLIT: Regex = Regex::new(r"[\s$^*@()/○•,?!;:`\[\]&]").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref DERIVATIONAL_PREFIXES: HashSet<&'static str> = [
        "a", "an", "ante", "anti", "auto", "circum", "co", "com", "con", "contra", "de", "dis",
        "en", "ex", "extra", "hetero", "homo", "inter", "intra", "kilo", "macro", "micro",
        "milli", "non", "pico", "pseudo", "pre", "post", "re", "sub", "syn", "trans", "tri",
        "un", "uni", "ultra",
    ]
    .into_iter()
    .collect();
}

/// Stop-word set shared by the build and query configurations.
#[derive(Debug, Clone, Default)]
pub struct StopWords(Arc<HashSet<String>>);

impl StopWords {
    /// Load a newline-delimited list.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::missing("stop-word list", path));
        }
        let text = fs::read_to_string(path)?;
        Ok(Self::from_words(text.lines()))
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        StopWords(Arc::new(set))
    }

    /// Built-in English list, used when no list is configured.
    pub fn english() -> Self {
        Self::from_words(ENGLISH_STOP_WORDS.iter().copied())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Substitute the fixed entity table. Applies to the whole line once any
/// entity-looking sequence is present.
pub fn replace_escapes(line: &str) -> String {
    if !ESCAPE.is_match(line) {
        return line.to_string();
    }
    line.replace("&blank;", "&")
        .replace("blank;", "&")
        .replace("&cir;", "○")
        .replace("&hyph;", "-")
        .replace("&sect;", "§")
        .replace("&times;", "×")
        .replace("&racute;", "r")
}

/// Case folding: NFKC, lowercase, drop commas, strip surrounding punctuation.
pub fn fold_token(token: &str) -> String {
    let lowered = token.nfkc().collect::<String>().to_lowercase().replace(',', "");
    lowered.trim_matches(|c: char| PUNCTUATION.contains(c)).to_string()
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name {
        "Jan" | "January" => 1,
        "Feb" | "February" => 2,
        "Mar" | "March" => 3,
        "Apr" | "April" => 4,
        "May" => 5,
        "Jun" | "June" => 6,
        "Jul" | "July" => 7,
        "Aug" | "August" => 8,
        "Sep" | "Sept" | "September" => 9,
        "Oct" | "October" => 10,
        "Nov" | "November" => 11,
        "Dec" | "December" => 12,
        _ => return None,
    };
    Some(month)
}

/// Normalize a date to `MM-DD-YYYY`. `month` is either a number or an
/// English month name. Two-digit years pivot at 19 (`00`..`18` are 20xx).
/// Returns `None` for dates outside 1918..=2018 or with an impossible
/// month/day (February allows 29 regardless of the year).
pub fn normalize_date(month: &str, day: &str, year: &str) -> Option<String> {
    let month_name = month.trim_end_matches('.');
    let month = match month_name.parse::<u32>() {
        Ok(m) => m,
        Err(_) => month_from_name(month_name)?,
    };
    let day: u32 = day.parse().ok()?;
    let two_digit = year.len() == 2;
    let mut year: u32 = year.parse().ok()?;

    let max_day = match month {
        2 => 29,
        4 | 6 | 9 | 11 => 30,
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        _ => return None,
    };
    if day < 1 || day > max_day {
        return None;
    }

    if two_digit {
        year += if year < 19 { 2000 } else { 1900 };
    }
    if !(1918..=2018).contains(&year) {
        return None;
    }
    Some(format!("{month:02}-{day:02}-{year}"))
}

fn record(acc: &mut Accumulator, term: &str) {
    if !term.is_empty() {
        acc.record_special(term);
    }
}

/// Run `f` on every match of `re`, then remove all matches from the line.
fn consume<F: FnMut(&Captures)>(re: &Regex, line: String, mut f: F) -> String {
    if !re.is_match(&line) {
        return line;
    }
    for caps in re.captures_iter(&line) {
        f(&caps);
    }
    re.replace_all(&line, "").into_owned()
}

fn is_alpha(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_alphabetic)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_numeric)
}

fn record_hyphenated(matched: &str, stops: &StopWords, acc: &mut Accumulator) {
    let token = fold_token(matched);
    let parts: Vec<&str> = token.split('-').collect();
    if parts.len() == 2 && is_alpha(parts[0]) && is_digits(parts[1]) {
        if parts[0].chars().count() >= 3 {
            record(acc, &fold_token(parts[0]));
        }
    } else if parts.len() == 2 && is_digits(parts[0]) && is_alpha(parts[1]) {
        if parts[1].chars().count() >= 3 {
            record(acc, &fold_token(parts[1]));
        }
    } else if DERIVATIONAL_PREFIXES.contains(parts[0]) {
        if let Some(stem) = parts.get(1) {
            record(acc, &fold_token(stem));
        }
    } else {
        for part in &parts {
            if !stops.contains(part) {
                record(acc, part);
            }
        }
    }
    // The joined form is always indexed, even when a branch above already
    // recorded one of its parts.
    record(acc, &token.replace('-', ""));
}

/// Record every special token in `line` and return what is left of it.
pub fn extract_special_tokens(line: &str, stops: &StopWords, acc: &mut Accumulator) -> String {
    let line = consume(&EMAIL, line.to_string(), |c| record(acc, &fold_token(&c[0])));
    let line = consume(&IP, line, |c| record(acc, &fold_token(&c[0])));
    let line = consume(&ABBREV, line, |c| record(acc, &fold_token(&fold_token(&c[0])).replace('.', "")));
    let line = consume(&DATE, line, |c| {
        let normalized = match c.get(1) {
            Some(month) => normalize_date(month.as_str(), &c[2], &c[3]),
            None => normalize_date(&c[4], &c[5], &c[6]),
        };
        if let Some(date) = normalized {
            record(acc, &date);
        }
    });
    let line = consume(&DECIMAL, line, |c| {
        let prefix = c[1].chars().last().map(String::from).unwrap_or_default();
        if let Ok(value) = c[2].parse::<f64>() {
            record(acc, &format!("{prefix}{:.0}", value.round_ties_even()));
        }
    });
    let line = consume(&HYPHEN, line, |c| record_hyphenated(&c[0], stops, acc));
    let line = consume(&URL, line, |c| record(acc, &c[0]));
    consume(&FILE_EXT, line, |c| record(acc, &c[0]))
}

/// Line normalizer shared by indexing and querying, so that document and
/// query terms compare equal.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    index_type: IndexType,
    stop_words: &'a StopWords,
}

impl<'a> Normalizer<'a> {
    pub fn new(index_type: IndexType, stop_words: &'a StopWords) -> Self {
        Self { index_type, stop_words }
    }

    /// Tokenize one line into `acc`.
    pub fn normalize_line(&self, line: &str, acc: &mut Accumulator) {
        let mut line = replace_escapes(line);
        if self.index_type == IndexType::Phrase {
            phrase::extract_line(&line, self.stop_words, acc);
            return;
        }
        if self.index_type.extracts_special_tokens() {
            line = extract_special_tokens(&line, self.stop_words, acc);
        }
        for raw in SPLIT.split(&line) {
            if raw.is_empty() {
                continue;
            }
            let token = fold_token(raw);
            if token.is_empty() {
                continue;
            }
            if self.index_type.drops_stop_words() && self.stop_words.contains(&token) {
                continue;
            }
            match self.index_type {
                // Snowball English (Porter2), not the classic Porter rules.
                IndexType::Stem => acc.record(&STEMMER.stem(&token)),
                IndexType::Single | IndexType::Positional => acc.record(&token),
                IndexType::Phrase => {}
            }
        }
    }

    /// Tokenize a multi-line body; blank lines are skipped.
    pub fn normalize_text(&self, text: &str, acc: &mut Accumulator) {
        for line in text.lines().filter(|l| !l.is_empty()) {
            self.normalize_line(line, acc);
        }
    }

    /// Query text through the same path as documents.
    pub fn query_terms(&self, query: &str) -> Accumulator {
        let mut acc = Accumulator::for_index(self.index_type);
        self.normalize_line(query, &mut acc);
        acc
    }

    /// Fold a single word the way a generic token of this variant is folded.
    /// `None` when the token would not be indexed.
    pub fn fold_word(&self, word: &str) -> Option<String> {
        let token = fold_token(word);
        if token.is_empty() {
            return None;
        }
        if self.index_type.drops_stop_words() && self.stop_words.contains(&token) {
            return None;
        }
        match self.index_type {
            IndexType::Stem => Some(STEMMER.stem(&token).into_owned()),
            _ => Some(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_terms(text: &str) -> Vec<String> {
        let stops = StopWords::english();
        Normalizer::new(IndexType::Single, &stops).query_terms(text).terms()
    }

    #[test]
    fn escapes_replace_across_the_whole_line() {
        assert_eq!(replace_escapes("x&hyph;ray costs &sect;5"), "x-ray costs §5");
        assert_eq!(replace_escapes("&blank; and blank;"), "& and &");
        assert_eq!(replace_escapes("no entities blank; here"), "no entities blank; here");
    }

    #[test]
    fn fold_strips_case_commas_and_edges() {
        assert_eq!(fold_token("\"Hello,\""), "hello");
        assert_eq!(fold_token("1,000."), "1000");
        assert_eq!(fold_token("--"), "");
        assert_eq!(fold_token("ﬁle"), "file");
    }

    #[test]
    fn dates_normalize_and_validate() {
        assert_eq!(normalize_date("Jan", "5", "2004").as_deref(), Some("01-05-2004"));
        assert_eq!(normalize_date("03", "04", "99").as_deref(), Some("03-04-1999"));
        assert_eq!(normalize_date("Dec.", "25", "17").as_deref(), Some("12-25-2017"));
        assert_eq!(normalize_date("Feb", "29", "2001").as_deref(), Some("02-29-2001"));
        assert_eq!(normalize_date("Feb", "30", "2004"), None);
        assert_eq!(normalize_date("13", "01", "2004"), None);
        assert_eq!(normalize_date("04", "31", "2004"), None);
        assert_eq!(normalize_date("01", "01", "1917"), None);
        assert_eq!(normalize_date("01", "01", "5"), None);
    }

    #[test]
    fn two_digit_years_with_leading_zero_pivot_to_2000s() {
        assert_eq!(normalize_date("01", "01", "05").as_deref(), Some("01-01-2005"));
        assert_eq!(normalize_date("01", "01", "00").as_deref(), Some("01-01-2000"));
        assert_eq!(normalize_date("01", "01", "18").as_deref(), Some("01-01-2018"));
        assert_eq!(normalize_date("01", "01", "19").as_deref(), Some("01-01-1919"));
        assert_eq!(
            single_terms("filed 05/06/07 today"),
            vec!["05-06-2007".to_string(), "filed".to_string(), "today".to_string()]
        );
    }

    #[test]
    fn invalid_dates_are_removed_without_a_term() {
        let terms = single_terms("Feb 30, 2004 filing");
        assert_eq!(terms, vec!["filing".to_string()]);
        let terms = single_terms("signed January 5, 2004 and 4/31/2004");
        assert_eq!(terms, vec!["01-05-2004".to_string(), "signed".to_string()]);
    }

    #[test]
    fn hyphen_rules() {
        let terms = single_terms("anti-war");
        assert_eq!(terms, vec!["war".to_string(), "antiwar".to_string()]);

        assert_eq!(single_terms("ab-12"), vec!["ab12".to_string()]);
        assert_eq!(single_terms("abc-12"), vec!["abc".to_string(), "abc12".to_string()]);
        assert_eq!(single_terms("12-abc"), vec!["abc".to_string(), "12abc".to_string()]);
        assert_eq!(
            single_terms("state-of-the-art"),
            vec!["state".to_string(), "art".to_string(), "stateoftheart".to_string()]
        );
    }

    #[test]
    fn hyphen_concatenation_double_counts() {
        let stops = StopWords::english();
        let acc = Normalizer::new(IndexType::Single, &stops).query_terms("foo-foo");
        assert_eq!(acc.get("foo").map(|p| p.tf()), Some(2));
        assert_eq!(acc.get("foofoo").map(|p| p.tf()), Some(1));
    }

    #[test]
    fn special_token_classes() {
        assert_eq!(single_terms("mail John.Doe@Example.COM"), vec!["john.doe@example.com", "mail"]);
        assert_eq!(single_terms("host 192.168.10.20 offline"), vec!["192.168.10.20", "host", "offline"]);
        assert_eq!(single_terms("the U.S. and IBM"), vec!["us", "ibm"]);
        assert_eq!(single_terms("paid $3.50 or §12.49"), vec!["$4", "§12", "paid"]);
        assert_eq!(single_terms("2.5"), vec!["2"]);
        assert_eq!(single_terms("see https://Example.com/Path now"), vec!["https://Example.com/Path", "see", "now"]);
        assert_eq!(single_terms("open scan.Pdf"), vec!["scan.Pdf", "open"]);
        // Upper-case extensions look like abbreviations and are taken first.
        assert_eq!(single_terms("open photo.JPG"), vec!["jpg", "open", "photo"]);
    }

    #[test]
    fn stem_variant_stems_after_stop_words() {
        let stops = StopWords::english();
        let terms = Normalizer::new(IndexType::Stem, &stops).query_terms("The runners were running").terms();
        assert!(terms.contains(&"run".to_string()));
        assert!(!terms.iter().any(|t| t == "the"));
    }

    #[test]
    fn positional_keeps_stop_words_and_skips_special_tokens() {
        let stops = StopWords::english();
        let acc = Normalizer::new(IndexType::Positional, &stops).query_terms("The New York (Times)");
        assert_eq!(acc.get("the").unwrap().positions(), &[1]);
        assert_eq!(acc.get("times").unwrap().positions(), &[4]);
    }

    #[test]
    fn fold_word_matches_variant_rules() {
        let stops = StopWords::english();
        assert_eq!(Normalizer::new(IndexType::Single, &stops).fold_word("The"), None);
        assert_eq!(Normalizer::new(IndexType::Positional, &stops).fold_word("The").as_deref(), Some("the"));
        assert_eq!(Normalizer::new(IndexType::Stem, &stops).fold_word("Running").as_deref(), Some("run"));
    }

    #[test]
    fn missing_stop_list_is_fatal() {
        let err = StopWords::load("/definitely/not/here/stops.txt").unwrap_err();
        assert!(matches!(err, Error::MissingInput { kind: "stop-word list", .. }));
    }
}
