//! Triple buffering and on-disk spill segments for memory-bounded builds.

use crate::accumulator::Triple;
use crate::config::MemoryLimit;
use crate::persist::{create_text, open_text};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Ceiling on segment handles open at the same time.
#[derive(Debug)]
pub struct HandleBudget {
    limit: usize,
    open: Mutex<usize>,
}

impl HandleBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, open: Mutex::new(0) }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn open(&self) -> usize {
        *self.open.lock()
    }

    /// Reserve `count` handles, failing without side effects if that would
    /// exceed the limit.
    pub fn acquire(&self, count: usize) -> Result<HandleLease<'_>> {
        let mut open = self.open.lock();
        let requested = *open + count;
        if requested > self.limit {
            return Err(Error::SegmentCapacity { requested, limit: self.limit });
        }
        *open = requested;
        Ok(HandleLease { budget: self, count })
    }
}

/// Handles held until dropped.
#[derive(Debug)]
pub struct HandleLease<'a> {
    budget: &'a HandleBudget,
    count: usize,
}

impl HandleLease<'_> {
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Drop for HandleLease<'_> {
    fn drop(&mut self) {
        *self.budget.open.lock() -= self.count;
    }
}

/// One spill file, `temp/segment-NNNNN.txt`.
#[derive(Debug, Clone)]
pub struct Segment {
    path: PathBuf,
    len: usize,
}

impl Segment {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn open(&self) -> Result<BufReader<File>> {
        open_text(&self.path, "spill segment")
    }

    fn append(&mut self, batch: &[Triple]) -> Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut out = BufWriter::new(file);
        for t in batch {
            writeln!(out, "{t}")?;
        }
        out.flush()?;
        self.len += batch.len();
        Ok(())
    }

    /// Replace the file contents with `triples`, which must be a permutation
    /// of what the segment holds.
    pub(crate) fn rewrite(&mut self, triples: &[Triple]) -> Result<()> {
        let mut out = create_text(&self.path)?;
        for t in triples {
            writeln!(out, "{t}")?;
        }
        out.flush()?;
        self.len = triples.len();
        Ok(())
    }
}

/// Fixed-capacity segments in a directory, filled lowest index first.
#[derive(Debug)]
pub struct SegmentPool {
    dir: PathBuf,
    capacity: usize,
    segments: Vec<Segment>,
    budget: HandleBudget,
}

impl SegmentPool {
    pub fn create(dir: &Path, capacity: usize, max_open: usize) -> Result<Self> {
        create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            capacity: capacity.max(1),
            segments: Vec::new(),
            budget: HandleBudget::new(max_open),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub(crate) fn segments_mut(&mut self) -> &mut [Segment] {
        &mut self.segments
    }

    pub fn budget(&self) -> &HandleBudget {
        &self.budget
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_triples(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// Write `batch` into the segments with room, opening new ones as needed.
    /// Earlier segments are only ever appended to.
    pub fn flush(&mut self, batch: &[Triple]) -> Result<()> {
        let mut rest = batch;
        while !rest.is_empty() {
            let idx = match self.segments.iter().position(|s| s.len < self.capacity) {
                Some(idx) => idx,
                None => {
                    let path = self.dir.join(format!("segment-{:05}.txt", self.segments.len()));
                    // Stale files from an earlier build in the same directory.
                    File::create(&path)?;
                    self.segments.push(Segment { path, len: 0 });
                    self.segments.len() - 1
                }
            };
            let room = self.capacity - self.segments[idx].len;
            let (head, tail) = rest.split_at(room.min(rest.len()));
            let _lease = self.budget.acquire(1)?;
            self.segments[idx].append(head)?;
            rest = tail;
        }
        tracing::debug!(segments = self.segments.len(), flushed = batch.len(), "spilled triples");
        Ok(())
    }
}

/// Where the triples of a build ended up.
#[derive(Debug)]
pub enum Spilled {
    InMemory(Vec<Triple>),
    Segments(SegmentPool),
}

/// Collects triples from finished documents. Unbounded mode keeps one
/// in-memory sequence; bounded mode buffers up to the memory limit and flushes
/// a full buffer before taking the next triple.
#[derive(Debug)]
pub struct SpillManager {
    buffer: Vec<Triple>,
    capacity: Option<usize>,
    pool: Option<SegmentPool>,
}

impl SpillManager {
    pub fn new(memory: MemoryLimit, temp_dir: &Path, max_open: usize) -> Result<Self> {
        let (capacity, pool) = match memory.cap() {
            Some(cap) => (Some(cap), Some(SegmentPool::create(temp_dir, cap, max_open)?)),
            None => (None, None),
        };
        Ok(Self { buffer: Vec::new(), capacity, pool })
    }

    pub fn unbounded() -> Self {
        Self { buffer: Vec::new(), capacity: None, pool: None }
    }

    pub fn push(&mut self, triple: Triple) -> Result<()> {
        if let (Some(cap), Some(pool)) = (self.capacity, self.pool.as_mut()) {
            if self.buffer.len() >= cap {
                pool.flush(&self.buffer)?;
                self.buffer.clear();
            }
        }
        self.buffer.push(triple);
        Ok(())
    }

    pub fn extend<I: IntoIterator<Item = Triple>>(&mut self, triples: I) -> Result<()> {
        for t in triples {
            self.push(t)?;
        }
        Ok(())
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn finish(mut self) -> Result<Spilled> {
        match self.pool.take() {
            Some(mut pool) => {
                if !self.buffer.is_empty() {
                    pool.flush(&self.buffer)?;
                }
                tracing::info!(segments = pool.len(), triples = pool.total_triples(), "spill complete");
                Ok(Spilled::Segments(pool))
            }
            None => Ok(Spilled::InMemory(self.buffer)),
        }
    }
}
