use indexer::build_index;
use query::{run_dynamic, run_query};
use search_core::{BuildConfig, CancelToken, Error, IndexType, MemoryLimit, QueryConfig, RetrievalModel, StopWords};
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const CORPUS: &str = "\
<DOC><DOCNO>D1</DOCNO><TEXT>
Rail strike in France halted trains.
The rail strike continued.
</TEXT></DOC>
<DOC><DOCNO>D2</DOCNO><TEXT>
Nuclear weapons treaty talks resumed.
Nuclear weapons inspectors arrived.
</TEXT></DOC>
<DOC><DOCNO>D3</DOCNO><TEXT>
Rail workers voted.
A nuclear weapons debate followed the rail strike vote.
</TEXT></DOC>
<DOC><DOCNO>D4</DOCNO><TEXT>
Weather was mild in Paris.
</TEXT></DOC>
<DOC><DOCNO>D5</DOCNO><TEXT>
Farmers harvested wheat early.
</TEXT></DOC>
<DOC><DOCNO>D6</DOCNO><TEXT>
Stock markets rallied on Monday.
</TEXT></DOC>
";

const QUERIES: &str = "\
<top>
<num> Number: 101
<title> Topic: rail strike
</top>
<top>
<num> Number: 102
<title> Topic: nuclear weapons treaty
</top>
";

struct Fixture {
    _corpus: TempDir,
    out: TempDir,
}

impl Fixture {
    fn new(variants: &[IndexType]) -> Self {
        let corpus = tempdir().unwrap();
        let out = tempdir().unwrap();
        fs::write(corpus.path().join("docs.txt"), CORPUS).unwrap();
        fs::write(out.path().join("queries.txt"), QUERIES).unwrap();
        for &index_type in variants {
            let config = BuildConfig::new(corpus.path(), out.path(), index_type, StopWords::english())
                .with_memory(MemoryLimit::Triples(4));
            build_index(&config).unwrap();
        }
        Self { _corpus: corpus, out }
    }

    fn config(&self) -> QueryConfig {
        QueryConfig::new(
            self.out.path(),
            self.out.path().join("queries.txt"),
            self.out.path().join("results").join("results.txt"),
            StopWords::english(),
        )
    }

    fn results(&self) -> Vec<Vec<String>> {
        read_results(&self.out.path().join("results").join("results.txt"))
    }
}

fn read_results(path: &Path) -> Vec<Vec<String>> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.split_whitespace().map(String::from).collect())
        .collect()
}

fn for_query<'a>(lines: &'a [Vec<String>], num: &str) -> Vec<&'a Vec<String>> {
    lines.iter().filter(|l| l[0] == num).collect()
}

#[test]
fn bm25_results_are_ranked_from_zero() {
    let fx = Fixture::new(&[IndexType::Single]);
    let report = run_query(&fx.config(), RetrievalModel::Bm25, IndexType::Single).unwrap();
    assert_eq!(report.queries, 2);

    let lines = fx.results();
    assert_eq!(report.result_lines, lines.len());
    for line in &lines {
        assert_eq!(line.len(), 6);
        assert_eq!(line[1], "0");
        assert_eq!(line[5], "BM25");
    }
    let rail = for_query(&lines, "101");
    let docs: Vec<&str> = rail.iter().map(|l| l[2].as_str()).collect();
    assert_eq!(docs, vec!["D1", "D3"]);
    let ranks: Vec<&str> = rail.iter().map(|l| l[3].as_str()).collect();
    assert_eq!(ranks, vec!["0", "1"]);
    assert_eq!(for_query(&lines, "102")[0][2], "D2");
}

#[test]
fn lm_scores_every_document() {
    let fx = Fixture::new(&[IndexType::Single]);
    run_query(&fx.config(), RetrievalModel::Lm, IndexType::Single).unwrap();
    let lines = fx.results();
    let rail = for_query(&lines, "101");
    assert_eq!(rail.len(), 6);
    assert_eq!(rail[0][5], "LM");
    let scores: Vec<f64> = rail.iter().map(|l| l[4].parse().unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn cosine_over_stemmed_index() {
    let fx = Fixture::new(&[IndexType::Stem]);
    run_query(&fx.config(), RetrievalModel::Cosine, IndexType::Stem).unwrap();
    let lines = fx.results();
    let rail = for_query(&lines, "101");
    assert_eq!(rail[0][2], "D1");
    assert_eq!(rail[0][5], "COSINE");
    for line in rail {
        let score: f64 = line[4].parse().unwrap();
        assert!(score > 0.0 && score <= 1.0);
    }
}

#[test]
fn phrase_index_answers_phrase_queries() {
    let fx = Fixture::new(&[IndexType::Phrase]);
    run_query(&fx.config(), RetrievalModel::Bm25, IndexType::Phrase).unwrap();
    let lines = fx.results();
    let rail: Vec<&str> = for_query(&lines, "101").iter().map(|l| l[2].as_str()).collect();
    assert_eq!(rail, vec!["D1", "D3"]);
}

#[test]
fn dynamic_run_blends_phrase_and_single_tiers() {
    let fx = Fixture::new(&[IndexType::Phrase, IndexType::Positional, IndexType::Single]);
    let report = run_dynamic(&fx.config()).unwrap();
    assert_eq!(report.queries, 2);
    let lines = fx.results();
    assert!(lines.iter().all(|l| l[5] == "BM25"));
    let rail: Vec<&str> = for_query(&lines, "101").iter().map(|l| l[2].as_str()).collect();
    assert!(rail.contains(&"D1") && rail.contains(&"D3"));
    assert_eq!(for_query(&lines, "102")[0][2], "D2");
    assert!(for_query(&lines, "102").len() <= 100);
}

#[test]
fn missing_inputs_are_reported() {
    let empty = tempdir().unwrap();
    let config = QueryConfig::new(empty.path(), empty.path().join("q.txt"), empty.path().join("r.txt"), StopWords::english());
    match run_query(&config, RetrievalModel::Bm25, IndexType::Single) {
        Err(Error::MissingInput { kind, .. }) => assert_eq!(kind, "index file"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(run_dynamic(&config), Err(Error::MissingInput { .. })));

    let fx = Fixture::new(&[IndexType::Single]);
    let config = QueryConfig::new(fx.out.path(), fx.out.path().join("nope.txt"), fx.out.path().join("r.txt"), StopWords::english());
    match run_query(&config, RetrievalModel::Bm25, IndexType::Single) {
        Err(Error::MissingInput { kind, .. }) => assert_eq!(kind, "query file"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn cancelled_run_stops() {
    let fx = Fixture::new(&[IndexType::Single]);
    let cancel = CancelToken::new();
    cancel.cancel();
    let config = fx.config().with_cancel(cancel);
    assert!(matches!(run_query(&config, RetrievalModel::Bm25, IndexType::Single), Err(Error::Cancelled)));
}
