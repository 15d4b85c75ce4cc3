//! External sort-merge of spill segments into one sorted triple stream.

use crate::accumulator::Triple;
use crate::persist::{create_text, open_text};
use crate::spill::{Segment, SegmentPool};
use crate::{Error, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Line-by-line triple reader over any buffered source.
pub struct TripleReader<R> {
    reader: R,
    path: PathBuf,
    line_no: usize,
    line: String,
}

impl<R: BufRead> TripleReader<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self { reader, path: path.into(), line_no: 0, line: String::new() }
    }

    fn next_triple(&mut self) -> Result<Option<Triple>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.line.trim_end_matches(&['\n', '\r'][..]);
            if line.is_empty() {
                continue;
            }
            return Triple::parse(line).map(Some).map_err(|reason| Error::Malformed {
                what: "triple",
                path: self.path.clone(),
                line: self.line_no,
                reason,
            });
        }
    }
}

impl<R: BufRead> Iterator for TripleReader<R> {
    type Item = Result<Triple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_triple().transpose()
    }
}

/// Open a triple file such as `merged-triples.txt`.
pub fn read_triples(path: &Path) -> Result<TripleReader<std::io::BufReader<std::fs::File>>> {
    let reader = open_text(path, "triple file")?;
    Ok(TripleReader::new(reader, path))
}

/// Sort one segment's triples in place.
pub fn sort_segment(segment: &mut Segment) -> Result<()> {
    let mut triples = TripleReader::new(segment.open()?, segment.path()).collect::<Result<Vec<_>>>()?;
    triples.sort();
    segment.rewrite(&triples)
}

/// Min-heap merge over sorted sources, yielding triples in global order.
pub struct KWayMerge<R> {
    sources: Vec<TripleReader<R>>,
    heap: BinaryHeap<Reverse<(Triple, usize)>>,
    primed: bool,
}

impl<R: BufRead> KWayMerge<R> {
    pub fn new(sources: Vec<TripleReader<R>>) -> Self {
        Self { sources, heap: BinaryHeap::new(), primed: false }
    }

    fn refill(&mut self, idx: usize) -> Result<()> {
        if let Some(t) = self.sources[idx].next_triple()? {
            self.heap.push(Reverse((t, idx)));
        }
        Ok(())
    }

    fn next_triple(&mut self) -> Result<Option<Triple>> {
        if !self.primed {
            self.primed = true;
            for idx in 0..self.sources.len() {
                self.refill(idx)?;
            }
        }
        let Some(Reverse((triple, idx))) = self.heap.pop() else {
            return Ok(None);
        };
        self.refill(idx)?;
        Ok(Some(triple))
    }
}

impl<R: BufRead> Iterator for KWayMerge<R> {
    type Item = Result<Triple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_triple().transpose()
    }
}

/// Sort every segment, then merge them all into `out`. All segments are
/// opened at once, so the pool's handle budget must cover every segment;
/// otherwise this fails before any segment is opened for merging.
/// Returns the number of triples written.
pub fn external_sort(pool: &mut SegmentPool, out: &Path) -> Result<usize> {
    for segment in pool.segments_mut() {
        sort_segment(segment)?;
    }
    tracing::info!(segments = pool.len(), "sorted spill segments");

    let lease = pool.budget().acquire(pool.len())?;
    tracing::debug!(open = lease.count(), limit = pool.budget().limit(), "opened spill segments for merge");
    let mut sources = Vec::with_capacity(pool.len());
    for segment in pool.segments() {
        sources.push(TripleReader::new(segment.open()?, segment.path()));
    }

    let mut writer = create_text(out)?;
    let mut written = 0usize;
    for triple in KWayMerge::new(sources) {
        writeln!(writer, "{}", triple?)?;
        written += 1;
    }
    writer.flush()?;
    tracing::info!(triples = written, path = %out.display(), "merged spill segments");
    Ok(written)
}
