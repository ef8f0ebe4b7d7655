//! K-way merge of per-segment record streams into one time-ordered stream.
//!
//! Each source contributes at most one buffered head. Ties on timestamp go
//! to the lower source index (segment open order); within a source, storage
//! order is kept because a source is only refilled after its head is emitted.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::segment::RawRecord;
use crate::time::Timestamp;

/// A record together with the index of the source that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecord {
    pub source: usize,
    pub record: RawRecord,
}

#[derive(Debug)]
struct Head {
    timestamp: Timestamp,
    source: usize,
    record: RawRecord,
}

impl Head {
    fn key(&self) -> (Timestamp, usize) {
        (self.timestamp, self.source)
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Pull-based merge over the sources it was built with.
///
/// A source error is yielded once, after which the cursor is fused.
pub struct MergeCursor<I> {
    /// `None` once a source is exhausted, dropping its cursor.
    sources: Vec<Option<I>>,
    heap: BinaryHeap<Reverse<Head>>,
    /// Source whose head was emitted last and still needs a refill.
    pending: Option<usize>,
    primed: bool,
    done: bool,
}

impl<I> MergeCursor<I>
where
    I: Iterator<Item = Result<RawRecord>>,
{
    pub fn new(sources: Vec<I>) -> Self {
        let heap = BinaryHeap::with_capacity(sources.len());
        Self {
            sources: sources.into_iter().map(Some).collect(),
            heap,
            pending: None,
            primed: false,
            done: false,
        }
    }

    /// Number of sources that may still produce records.
    pub fn active_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.is_some()).count()
    }

    fn refill(&mut self, source: usize) -> Result<()> {
        let Some(iter) = self.sources[source].as_mut() else {
            return Ok(());
        };
        match iter.next() {
            Some(Ok(record)) => {
                self.heap.push(Reverse(Head {
                    timestamp: record.timestamp,
                    source,
                    record,
                }));
                Ok(())
            }
            Some(Err(err)) => {
                self.sources[source] = None;
                Err(err)
            }
            None => {
                self.sources[source] = None;
                Ok(())
            }
        }
    }

    fn fail<T>(&mut self, err: crate::error::BagError) -> Option<Result<T>> {
        self.done = true;
        self.heap.clear();
        self.sources.clear();
        Some(Err(err))
    }
}

impl<I> Iterator for MergeCursor<I>
where
    I: Iterator<Item = Result<RawRecord>>,
{
    type Item = Result<MergedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.primed {
            self.primed = true;
            for source in 0..self.sources.len() {
                if let Err(err) = self.refill(source) {
                    return self.fail(err);
                }
            }
        }
        if let Some(source) = self.pending.take() {
            if let Err(err) = self.refill(source) {
                return self.fail(err);
            }
        }

        match self.heap.pop() {
            Some(Reverse(head)) => {
                self.pending = Some(head.source);
                Some(Ok(MergedRecord {
                    source: head.source,
                    record: head.record,
                }))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
