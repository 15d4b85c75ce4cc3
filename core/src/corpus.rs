use crate::persist::open_text;
use crate::{DocId, Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::io::{BufRead, ErrorKind};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

lazy_static! {
    static ref DOC: Regex = Regex::new(r"(?is)<doc>(.*?)</doc>").expect("valid regex");
    static ref DOCNO: Regex = Regex::new(r"(?is)<docno>(.*?)</docno>").expect("valid regex");
    static ref TEXT: Regex = Regex::new(r"(?is)<text>(.*?)</text>").expect("valid regex");
}

/// One `<DOC>` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub doc_id: DocId,
    pub text: String,
}

impl Document {
    /// Non-empty lines of the text body.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines().filter(|l| !l.is_empty())
    }
}

/// Extract every `<DOC>` record of a TREC file. Records without a `<DOCNO>`
/// are skipped; a missing `<TEXT>` gives an empty body.
pub fn parse_documents(data: &str) -> Vec<Document> {
    let mut docs = Vec::new();
    for record in DOC.captures_iter(data) {
        let body = &record[1];
        let Some(doc_id) = DOCNO.captures(body).map(|c| c[1].trim().to_string()) else {
            tracing::warn!("skipping <DOC> record without <DOCNO>");
            continue;
        };
        let text: String = TEXT.captures_iter(body).map(|c| c[1].to_string()).collect::<Vec<_>>().join("\n");
        docs.push(Document { doc_id, text });
    }
    docs
}

/// Files under a corpus directory, walked recursively in path order.
pub fn corpus_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::missing("corpus directory", dir));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => Error::Io(io),
            None => Error::Io(std::io::Error::new(ErrorKind::Other, "filesystem loop in corpus")),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let bytes = fs::read(path)?;
    Ok(parse_documents(&String::from_utf8_lossy(&bytes)))
}

/// A topic from the query file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub num: String,
    pub text: String,
}

/// Pair `<num> Number: N` lines with `<title> Topic: text` lines, in order.
pub fn parse_queries<R: BufRead>(reader: R) -> Result<Vec<Query>> {
    let mut nums = Vec::new();
    let mut titles = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with("<num>") {
            nums.push(line.replace("<num> Number: ", "").trim_end().to_string());
        } else if line.starts_with("<title>") {
            titles.push(line.replace("<title> Topic: ", "").trim_end().to_string());
        }
    }
    Ok(nums.into_iter().zip(titles).map(|(num, text)| Query { num, text }).collect())
}

pub fn read_queries(path: &Path) -> Result<Vec<Query>> {
    parse_queries(open_text(path, "query file")?)
}
