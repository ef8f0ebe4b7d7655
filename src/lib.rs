//! Reader for rosbag2 SQLite bags.
//!
//! A bag is one or more `.db3` segments. [`BagReader`] opens them together,
//! merges their topic catalogs and yields every message in timestamp order,
//! decoding payloads lazily through an injected [`MessageDecoder`].

pub mod bag;
pub mod cdr;
pub mod config;
pub mod decode;
pub mod discovery;
pub mod error;
pub mod merge;
pub mod message;
pub mod qos;
pub mod registry;
pub mod segment;
pub mod time;
pub mod topic;

pub use bag::{BagReader, MessageQuery, Messages, ReadOptions};
pub use cdr::{CdrDecoder, MessageDefinitions};
pub use config::{ReaderConfig, load_reader_config};
pub use decode::{MessageDecoder, RawBytesDecoder};
pub use discovery::discover_segments;
pub use error::{BagError, DecodeError, Result};
pub use message::DecodedMessage;
pub use qos::QosProfile;
pub use registry::SchemaRegistry;
pub use segment::{ScanPredicate, SegmentStore};
pub use time::{TimeFormat, Timestamp};
pub use topic::TopicDefinition;
