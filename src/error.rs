use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::topic::TopicDefinition;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BagError>;

/// One segment that failed to close, kept for the aggregated report.
#[derive(Debug)]
pub struct CloseFailureEntry {
    pub path: PathBuf,
    pub source: rusqlite::Error,
}

/// Every close error collected by `BagReader::close`.
#[derive(Debug)]
pub struct CloseFailures(pub Vec<CloseFailureEntry>);

impl fmt::Display for CloseFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, entry) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", entry.path.display(), entry.source)?;
        }
        Ok(())
    }
}

/// Canonical error surface for bag reading.
#[derive(Debug, Error)]
pub enum BagError {
    #[error("Call open() before {operation}")]
    NotOpen { operation: &'static str },

    #[error("Segment is already open: {path}")]
    AlreadyOpen { path: PathBuf },

    #[error("Segment unavailable: {path}: {reason}")]
    SegmentUnavailable {
        path: PathBuf,
        reason: Cow<'static, str>,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error(
        "Schema conflict on topic {name}: {} ({}) vs {} ({})",
        .existing.type_name,
        .existing.serialization_format,
        .incoming.type_name,
        .incoming.serialization_format
    )]
    SchemaConflict {
        name: String,
        existing: Box<TopicDefinition>,
        incoming: Box<TopicDefinition>,
    },

    #[error("Failed to close {} segment(s): {failures}", .failures.0.len())]
    CloseFailure { failures: CloseFailures },

    #[error("Query failed on {path}: {source}")]
    Query {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Message references unknown topic id {topic_id} in {path}")]
    UnknownTopicId { path: PathBuf, topic_id: i64 },

    #[error("Segment discovery failed under {root}: {source}")]
    Discovery {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Invalid timestamp {input:?}: {reason}")]
    InvalidTimestamp {
        input: String,
        reason: &'static str,
    },

    #[error("Config error in {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

impl BagError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::SegmentUnavailable {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn query(path: impl Into<PathBuf>, source: rusqlite::Error) -> Self {
        Self::Query {
            path: path.into(),
            source,
        }
    }
}

/// Failure to turn one payload into a structured value.
///
/// Stored in the message's value slot instead of ending the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Unsupported serialization format: {0}")]
    UnsupportedFormat(String),

    #[error("No message definition for type {0}")]
    UnknownType(String),

    #[error("Buffer too short: needed {needed} byte(s) at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Unsupported CDR encapsulation kind {0:#06x}")]
    UnsupportedEncapsulation(u16),

    #[error("Field {field} is not valid UTF-8")]
    InvalidUtf8 { field: String },

    #[error("Invalid message definition for {type_name}: {reason}")]
    InvalidDefinition { type_name: String, reason: String },

    #[error("{0}")]
    Custom(String),
}
