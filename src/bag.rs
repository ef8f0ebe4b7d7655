//! The bag reader: one logical, time-ordered log over a set of segments.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cdr::CdrDecoder;
use crate::config::ReaderConfig;
use crate::decode::MessageDecoder;
use crate::discovery::discover_segments;
use crate::error::{BagError, CloseFailures, Result};
use crate::merge::MergeCursor;
use crate::message::DecodedMessage;
use crate::registry::SchemaRegistry;
use crate::segment::{ScanPredicate, ScanRecords, SegmentScan, SegmentStore};
use crate::time::Timestamp;
use crate::topic::TopicDefinition;

/// Filters for [`BagReader::read_messages`]. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Inclusive lower bound.
    pub start_time: Option<Timestamp>,
    /// Exclusive upper bound.
    pub end_time: Option<Timestamp>,
    /// Topic names to keep. An empty set keeps nothing.
    pub topics: Option<BTreeSet<String>>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn start_time(mut self, start: Timestamp) -> Self {
        self.start_time = Some(start);
        self
    }

    #[must_use]
    pub fn end_time(mut self, end: Timestamp) -> Self {
        self.end_time = Some(end);
        self
    }

    #[must_use]
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    /// Translates the options into one segment's local predicate.
    fn predicate_for(&self, segment: &SegmentStore) -> Result<ScanPredicate> {
        let topic_ids = match &self.topics {
            Some(names) => Some(segment.resolve_topic_ids(names)?),
            None => None,
        };
        Ok(ScanPredicate {
            start: self.start_time,
            end: self.end_time,
            topic_ids,
        })
    }
}

/// Reads a bag made of zero or more SQLite segments.
///
/// Segments are opened in the order given; that order also breaks timestamp
/// ties in the merged stream and fixes the order of [`read_topics`](Self::read_topics).
pub struct BagReader {
    segments: Vec<SegmentStore>,
    registry: SchemaRegistry,
    decoder: Arc<dyn MessageDecoder>,
    open: bool,
}

impl BagReader {
    pub fn new<I, P>(paths: I, decoder: Arc<dyn MessageDecoder>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            segments: paths.into_iter().map(SegmentStore::new).collect(),
            registry: SchemaRegistry::new(),
            decoder,
            open: false,
        }
    }

    /// Builds a reader over every segment found below `root`.
    pub fn from_directory(root: &Path, extension: &str, decoder: Arc<dyn MessageDecoder>) -> Result<Self> {
        Ok(Self::new(discover_segments(root, extension)?, decoder))
    }

    /// Opens a single segment file with the built-in CDR decoder.
    pub fn open_file(path: impl Into<PathBuf>, config: &ReaderConfig) -> Result<Self> {
        let mut bag = Self::new([path.into()], default_decoder(config));
        bag.open()?;
        Ok(bag)
    }

    /// Discovers and opens every segment under `root` with the built-in CDR decoder.
    pub fn open_directory(root: &Path, config: &ReaderConfig) -> Result<Self> {
        let mut bag = Self::from_directory(root, &config.segment_extension, default_decoder(config))?;
        bag.open()?;
        Ok(bag)
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn segment_paths(&self) -> impl Iterator<Item = &Path> {
        self.segments.iter().map(SegmentStore::path)
    }

    /// Opens every segment and merges their catalogs. All or nothing: on
    /// failure no segment is left open and the catalog stays empty.
    pub fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(BagError::AlreadyOpen {
                path: self
                    .segments
                    .first()
                    .map(|s| s.path().to_path_buf())
                    .unwrap_or_default(),
            });
        }

        if let Err(err) = open_all(&mut self.segments, &mut self.registry) {
            for segment in &mut self.segments {
                if let Err(close_err) = segment.close() {
                    warn!(path = %segment.path().display(), %close_err, "failed to close segment after aborted open");
                }
            }
            self.registry.clear();
            return Err(err);
        }

        self.open = true;
        debug!(
            segments = self.segments.len(),
            topics = self.registry.len(),
            "opened bag"
        );
        Ok(())
    }

    /// Closes every segment, continuing past failures. All failures are
    /// reported together.
    pub fn close(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for segment in &mut self.segments {
            match segment.close() {
                Ok(()) => {}
                Err(BagError::CloseFailure { failures: entries }) => failures.extend(entries.0),
                Err(err) => warn!(path = %segment.path().display(), %err, "unexpected error while closing segment"),
            }
        }
        self.registry.clear();
        self.open = false;

        if failures.is_empty() {
            return Ok(());
        }
        for entry in &failures {
            warn!(path = %entry.path.display(), error = %entry.source, "segment failed to close");
        }
        Err(BagError::CloseFailure {
            failures: CloseFailures(failures),
        })
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(BagError::NotOpen { operation })
        }
    }

    /// Every topic in the bag, in first-sighting order.
    pub fn read_topics(&self) -> Result<&[Arc<TopicDefinition>]> {
        self.ensure_open("reading topics")?;
        Ok(self.registry.all())
    }

    /// `(earliest, latest)` message timestamp. Empty segments are ignored;
    /// a bag without messages reports the epoch-zero pair.
    pub fn time_range(&self) -> Result<(Timestamp, Timestamp)> {
        self.ensure_open("retrieving the time range")?;
        let mut range: Option<(Timestamp, Timestamp)> = None;
        for segment in &self.segments {
            let Some((start, end)) = segment.time_bounds()? else {
                continue;
            };
            range = Some(match range {
                Some((lo, hi)) => (lo.min(start), hi.max(end)),
                None => (start, end),
            });
        }
        Ok(range.unwrap_or((Timestamp::ZERO, Timestamp::ZERO)))
    }

    /// Message count per topic name, summed over segments.
    pub fn message_counts(&self) -> Result<BTreeMap<String, u64>> {
        self.ensure_open("retrieving message counts")?;
        let mut totals = BTreeMap::new();
        for segment in &self.segments {
            for (name, count) in segment.message_counts()? {
                *totals.entry(name).or_insert(0) += count;
            }
        }
        Ok(totals)
    }

    /// Prepares one filtered scan per segment. Call
    /// [`MessageQuery::messages`] to start pulling.
    pub fn read_messages(&self, options: &ReadOptions) -> Result<MessageQuery<'_>> {
        self.ensure_open("reading messages")?;
        let mut scans = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            let predicate = options.predicate_for(segment)?;
            scans.push(segment.scan(&predicate)?);
        }
        debug!(segments = scans.len(), ?options, "prepared message query");
        Ok(MessageQuery {
            segments: &self.segments,
            scans,
            decoder: Arc::clone(&self.decoder),
        })
    }
}

fn open_all(segments: &mut [SegmentStore], registry: &mut SchemaRegistry) -> Result<()> {
    for segment in segments.iter_mut() {
        segment.open()?;
        registry.merge_catalog(segment.topics()?)?;
    }
    Ok(())
}

fn default_decoder(config: &ReaderConfig) -> Arc<dyn MessageDecoder> {
    Arc::new(CdrDecoder::default().with_time_format(config.time_format))
}

/// Prepared per-segment scans for one read.
pub struct MessageQuery<'b> {
    segments: &'b [SegmentStore],
    scans: Vec<SegmentScan<'b>>,
    decoder: Arc<dyn MessageDecoder>,
}

impl MessageQuery<'_> {
    /// Executes the scans and returns the merged, single-pass stream.
    pub fn messages(&mut self) -> Result<Messages<'_>> {
        let mut sources = Vec::with_capacity(self.scans.len());
        for scan in &mut self.scans {
            sources.push(scan.records()?);
        }
        Ok(Messages {
            segments: self.segments,
            cursor: MergeCursor::new(sources),
            decoder: Arc::clone(&self.decoder),
            done: false,
        })
    }
}

/// Time-ordered messages across all segments. An `Err` item ends the stream.
pub struct Messages<'q> {
    segments: &'q [SegmentStore],
    cursor: MergeCursor<ScanRecords<'q>>,
    decoder: Arc<dyn MessageDecoder>,
    done: bool,
}

impl Iterator for Messages<'_> {
    type Item = Result<DecodedMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let merged = match self.cursor.next()? {
            Ok(merged) => merged,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        let segment = &self.segments[merged.source];
        let Some(topic) = segment.topic_by_id(merged.record.topic_id) else {
            self.done = true;
            return Some(Err(BagError::UnknownTopicId {
                path: segment.path().to_path_buf(),
                topic_id: merged.record.topic_id,
            }));
        };
        Some(Ok(DecodedMessage::new(
            Arc::clone(topic),
            merged.record.timestamp,
            merged.record.data,
            Arc::clone(&self.decoder),
        )))
    }
}
