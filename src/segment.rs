//! One physical bag segment: a read-only SQLite database holding a `topics`
//! catalog and a `messages` table keyed by nanosecond timestamp.
//!
//! The catalog is loaded into memory on `open()`. Message data is only ever
//! read through filtered queries: time bounds and topic ids become `WHERE`
//! clauses, and rows stream out of a live statement cursor one at a time.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags, Row, Rows, Statement, params, params_from_iter};
use tracing::{debug, warn};

use crate::error::{BagError, CloseFailureEntry, CloseFailures, Result};
use crate::qos::parse_qos_profiles;
use crate::time::Timestamp;
use crate::topic::TopicDefinition;

const REQUIRED_TOPIC_COLUMNS: &[&str] = &["id", "name", "type", "serialization_format"];
const REQUIRED_MESSAGE_COLUMNS: &[&str] = &["topic_id", "timestamp", "data"];
const QOS_COLUMN: &str = "offered_qos_profiles";

/// A message row as stored. `topic_id` only means something to the segment
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub topic_id: i64,
    pub timestamp: Timestamp,
    pub data: Vec<u8>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            topic_id: row.get(0)?,
            timestamp: Timestamp::from_nanos(row.get(1)?),
            data: row.get(2)?,
        })
    }
}

/// Filter pushed down into a segment query.
///
/// Time bounds are `[start, end)`, each optional. `topic_ids: None` means
/// every topic; `Some(vec![])` means none at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPredicate {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub topic_ids: Option<Vec<i64>>,
}

impl ScanPredicate {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_start(mut self, start: Timestamp) -> Self {
        self.start = Some(start);
        self
    }

    #[must_use]
    pub fn with_end(mut self, end: Timestamp) -> Self {
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn with_topic_ids(mut self, ids: Vec<i64>) -> Self {
        self.topic_ids = Some(ids);
        self
    }

    fn matches_nothing(&self) -> bool {
        matches!(&self.topic_ids, Some(ids) if ids.is_empty())
    }

    /// Builds the filtered query and its positional arguments.
    fn to_sql(&self) -> (String, Vec<i64>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<i64> = Vec::new();

        if let Some(start) = self.start {
            clauses.push("timestamp >= ?".to_string());
            args.push(start.to_nanos());
        }
        if let Some(end) = self.end {
            clauses.push("timestamp < ?".to_string());
            args.push(end.to_nanos());
        }
        if let Some(ids) = &self.topic_ids {
            if ids.len() == 1 {
                clauses.push("topic_id = ?".to_string());
            } else {
                let marks = vec!["?"; ids.len()].join(",");
                clauses.push(format!("topic_id IN ({marks})"));
            }
            args.extend(ids.iter().copied());
        }

        let mut sql = String::from("SELECT topic_id, timestamp, data FROM messages");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp ASC, rowid ASC");
        (sql, args)
    }
}

#[derive(Debug)]
struct SegmentContext {
    conn: Connection,
    /// Catalog order (ascending topic id).
    topics: Vec<Arc<TopicDefinition>>,
    id_to_topic: HashMap<i64, Arc<TopicDefinition>>,
    name_to_id: HashMap<String, i64>,
}

/// Read-only handle on one segment file.
#[derive(Debug)]
pub struct SegmentStore {
    path: PathBuf,
    context: Option<SegmentContext>,
}

impl SegmentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            context: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    /// Connects read-only, validates the schema and loads the topic catalog.
    pub fn open(&mut self) -> Result<()> {
        if self.context.is_some() {
            return Err(BagError::AlreadyOpen {
                path: self.path.clone(),
            });
        }
        if !self.path.is_file() {
            return Err(BagError::unavailable(&self.path, "file not found"));
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| self.unavailable_with("cannot open database", source))?;

        let topic_columns = table_columns(&conn, "topics")
            .map_err(|source| self.unavailable_with("not a readable bag database", source))?;
        let message_columns = table_columns(&conn, "messages")
            .map_err(|source| self.unavailable_with("not a readable bag database", source))?;
        for (table, columns, required) in [
            ("topics", &topic_columns, REQUIRED_TOPIC_COLUMNS),
            ("messages", &message_columns, REQUIRED_MESSAGE_COLUMNS),
        ] {
            if let Some(missing) = required.iter().find(|col| !columns.iter().any(|c| c == *col)) {
                return Err(BagError::unavailable(
                    &self.path,
                    format!("unsupported schema: {table}.{missing} is missing"),
                ));
            }
        }

        let has_qos = topic_columns.iter().any(|c| c == QOS_COLUMN);
        let context = self.load_catalog(conn, has_qos)?;
        debug!(
            path = %self.path.display(),
            topics = context.topics.len(),
            has_qos,
            "opened segment"
        );
        self.context = Some(context);
        Ok(())
    }

    fn load_catalog(&self, conn: Connection, has_qos: bool) -> Result<SegmentContext> {
        let sql = if has_qos {
            "SELECT id, name, type, serialization_format, offered_qos_profiles FROM topics ORDER BY id"
        } else {
            "SELECT id, name, type, serialization_format, NULL FROM topics ORDER BY id"
        };

        let rows = {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|source| self.unavailable_with("cannot read topic catalog", source))?;
            let mapped = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })
                .map_err(|source| self.unavailable_with("cannot read topic catalog", source))?;
            mapped
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|source| self.unavailable_with("cannot read topic catalog", source))?
        };

        let mut topics = Vec::with_capacity(rows.len());
        let mut id_to_topic = HashMap::with_capacity(rows.len());
        let mut name_to_id = HashMap::with_capacity(rows.len());
        for (id, name, type_name, serialization_format, qos_yaml) in rows {
            let offered_qos_profiles = match parse_qos_profiles(qos_yaml.as_deref().unwrap_or("")) {
                Ok(profiles) => profiles,
                Err(err) => {
                    warn!(path = %self.path.display(), topic = %name, %err, "ignoring unparseable QoS profiles");
                    Vec::new()
                }
            };
            let topic = Arc::new(TopicDefinition {
                name: name.clone(),
                type_name,
                serialization_format,
                offered_qos_profiles,
            });
            if name_to_id.insert(name, id).is_some() {
                warn!(path = %self.path.display(), topic = %topic.name, "duplicate topic name in catalog");
            }
            id_to_topic.insert(id, Arc::clone(&topic));
            topics.push(topic);
        }

        Ok(SegmentContext {
            conn,
            topics,
            id_to_topic,
            name_to_id,
        })
    }

    /// Releases the connection. Closing a closed segment is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(context) = self.context.take() else {
            return Ok(());
        };
        debug!(path = %self.path.display(), "closing segment");
        context.conn.close().map_err(|(_conn, source)| BagError::CloseFailure {
            failures: CloseFailures(vec![CloseFailureEntry {
                path: self.path.clone(),
                source,
            }]),
        })
    }

    fn context(&self, operation: &'static str) -> Result<&SegmentContext> {
        self.context.as_ref().ok_or(BagError::NotOpen { operation })
    }

    fn unavailable_with(&self, reason: &'static str, source: rusqlite::Error) -> BagError {
        BagError::SegmentUnavailable {
            path: self.path.clone(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// The topic catalog in ascending id order.
    pub fn topics(&self) -> Result<&[Arc<TopicDefinition>]> {
        Ok(&self.context("reading topics")?.topics)
    }

    pub fn topic_by_id(&self, topic_id: i64) -> Option<&Arc<TopicDefinition>> {
        self.context.as_ref()?.id_to_topic.get(&topic_id)
    }

    /// Maps topic names to this segment's ids. Names the segment does not
    /// know contribute nothing.
    pub fn resolve_topic_ids<I, S>(&self, names: I) -> Result<Vec<i64>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let context = self.context("resolving topics")?;
        let mut ids: Vec<i64> = names
            .into_iter()
            .filter_map(|name| context.name_to_id.get(name.as_ref()).copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// `(min, max)` timestamp over every message, or `None` when empty.
    pub fn time_bounds(&self) -> Result<Option<(Timestamp, Timestamp)>> {
        let context = self.context("retrieving the time range")?;
        let (start, end) = context
            .conn
            .query_row(
                "SELECT MIN(timestamp), MAX(timestamp) FROM messages",
                params![],
                |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .map_err(|source| BagError::query(&self.path, source))?;
        Ok(match (start, end) {
            (Some(start), Some(end)) => Some((Timestamp::from_nanos(start), Timestamp::from_nanos(end))),
            _ => None,
        })
    }

    /// Like [`time_bounds`](Self::time_bounds) but an empty segment reports
    /// the epoch-zero pair.
    pub fn time_range(&self) -> Result<(Timestamp, Timestamp)> {
        Ok(self.time_bounds()?.unwrap_or((Timestamp::ZERO, Timestamp::ZERO)))
    }

    /// Message count per topic name. Topics without messages are absent.
    pub fn message_counts(&self) -> Result<BTreeMap<String, u64>> {
        let context = self.context("retrieving message counts")?;
        let mut stmt = context
            .conn
            .prepare(
                "SELECT topics.name, COUNT(*) FROM messages
                 INNER JOIN topics ON messages.topic_id = topics.id
                 GROUP BY topics.id",
            )
            .map_err(|source| BagError::query(&self.path, source))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|source| BagError::query(&self.path, source))?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (name, count) = row.map_err(|source| BagError::query(&self.path, source))?;
            *counts.entry(name).or_insert(0) += count.max(0) as u64;
        }
        Ok(counts)
    }

    /// Prepares a filtered scan. Rows are pulled lazily through
    /// [`SegmentScan::records`].
    pub fn scan(&self, predicate: &ScanPredicate) -> Result<SegmentScan<'_>> {
        let context = self.context("reading messages")?;
        if predicate.matches_nothing() {
            debug!(path = %self.path.display(), "scan filters on no topics, skipping query");
            return Ok(SegmentScan {
                path: &self.path,
                statement: None,
                args: Vec::new(),
            });
        }

        let (sql, args) = predicate.to_sql();
        debug!(path = %self.path.display(), %sql, args = args.len(), "preparing segment scan");
        let statement = context
            .conn
            .prepare(&sql)
            .map_err(|source| BagError::query(&self.path, source))?;
        Ok(SegmentScan {
            path: &self.path,
            statement: Some(statement),
            args,
        })
    }
}

/// A prepared, not yet executed, segment query.
pub struct SegmentScan<'s> {
    path: &'s Path,
    statement: Option<Statement<'s>>,
    args: Vec<i64>,
}

impl SegmentScan<'_> {
    pub fn path(&self) -> &Path {
        self.path
    }

    /// Executes the query and returns a forward-only cursor over its rows.
    pub fn records(&mut self) -> Result<ScanRecords<'_>> {
        let Some(statement) = self.statement.as_mut() else {
            return Ok(ScanRecords {
                path: self.path,
                rows: None,
            });
        };
        let rows = statement
            .query(params_from_iter(self.args.iter()))
            .map_err(|source| BagError::query(self.path, source))?;
        Ok(ScanRecords {
            path: self.path,
            rows: Some(rows),
        })
    }
}

/// Live cursor over a segment query. Dropping it resets the statement.
pub struct ScanRecords<'r> {
    path: &'r Path,
    rows: Option<Rows<'r>>,
}

impl Iterator for ScanRecords<'_> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let rows = self.rows.as_mut()?;
        let next = match rows.next() {
            Ok(Some(row)) => Some(RawRecord::from_row(row).map_err(|source| BagError::query(self.path, source))),
            Ok(None) => None,
            Err(source) => Some(Err(BagError::query(self.path, source))),
        };
        // Release the cursor as soon as it is exhausted or broken.
        if !matches!(next, Some(Ok(_))) {
            self.rows = None;
        }
        next
    }
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LEGACY_SCHEMA: &str = "
        CREATE TABLE topics(id INTEGER PRIMARY KEY, name TEXT NOT NULL, type TEXT NOT NULL,
                            serialization_format TEXT NOT NULL);
        CREATE TABLE messages(id INTEGER PRIMARY KEY, topic_id INTEGER NOT NULL,
                              timestamp INTEGER NOT NULL, data BLOB NOT NULL);";

    const SCHEMA: &str = "
        CREATE TABLE topics(id INTEGER PRIMARY KEY, name TEXT NOT NULL, type TEXT NOT NULL,
                            serialization_format TEXT NOT NULL, offered_qos_profiles TEXT NOT NULL);
        CREATE TABLE messages(id INTEGER PRIMARY KEY, topic_id INTEGER NOT NULL,
                              timestamp INTEGER NOT NULL, data BLOB NOT NULL);
        CREATE INDEX timestamp_idx ON messages (timestamp ASC);";

    fn write_segment(dir: &TempDir, name: &str, messages: &[(i64, i64)]) -> PathBuf {
        let path = dir.path().join(name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        for (id, topic) in [(1, "/rosout"), (2, "/parameter_events"), (3, "/topic")] {
            conn.execute(
                "INSERT INTO topics VALUES (?1, ?2, 'std_msgs/msg/String', 'cdr', '- history: 1\n  depth: 10\n')",
                params![id, topic],
            )
            .unwrap();
        }
        for (topic_id, ts) in messages {
            conn.execute(
                "INSERT INTO messages (topic_id, timestamp, data) VALUES (?1, ?2, ?3)",
                params![topic_id, ts, ts.to_le_bytes().to_vec()],
            )
            .unwrap();
        }
        path
    }

    fn opened(path: PathBuf) -> SegmentStore {
        let mut store = SegmentStore::new(path);
        store.open().unwrap();
        store
    }

    fn scan_timestamps(store: &SegmentStore, predicate: &ScanPredicate) -> Vec<(i64, i64)> {
        let mut scan = store.scan(predicate).unwrap();
        scan.records()
            .unwrap()
            .map(|r| r.map(|rec| (rec.topic_id, rec.timestamp.to_nanos())))
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn open_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut store = SegmentStore::new(dir.path().join("nope.db3"));
        let err = store.open().unwrap_err();
        assert!(matches!(err, BagError::SegmentUnavailable { .. }), "{err:?}");
        assert!(!dir.path().join("nope.db3").exists());
    }

    #[test]
    fn open_garbage_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.db3");
        std::fs::write(&path, b"definitely not an sqlite header, just bytes").unwrap();
        let err = SegmentStore::new(path).open().unwrap_err();
        assert!(matches!(err, BagError::SegmentUnavailable { .. }), "{err:?}");
    }

    #[test]
    fn open_wrong_schema_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.db3");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE topics(id INTEGER PRIMARY KEY, name TEXT);")
            .unwrap();
        let err = SegmentStore::new(path).open().unwrap_err();
        match err {
            BagError::SegmentUnavailable { reason, .. } => assert!(reason.contains("unsupported schema")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lifecycle_errors() {
        let dir = TempDir::new().unwrap();
        let path = write_segment(&dir, "a.db3", &[]);
        let mut store = SegmentStore::new(path);
        assert!(matches!(store.topics(), Err(BagError::NotOpen { .. })));
        assert!(matches!(store.time_range(), Err(BagError::NotOpen { .. })));

        store.open().unwrap();
        assert!(matches!(store.open(), Err(BagError::AlreadyOpen { .. })));

        store.close().unwrap();
        store.close().unwrap();
        assert!(!store.is_open());
        store.open().unwrap();
    }

    #[test]
    fn loads_catalog_in_id_order_with_qos() {
        let dir = TempDir::new().unwrap();
        let store = opened(write_segment(&dir, "a.db3", &[]));
        let names: Vec<&str> = store.topics().unwrap().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["/rosout", "/parameter_events", "/topic"]);
        let rosout = &store.topics().unwrap()[0];
        assert_eq!(rosout.offered_qos_profiles.len(), 1);
        assert_eq!(rosout.offered_qos_profiles[0].depth, 10);
        assert_eq!(store.topic_by_id(3).map(|t| t.name.as_str()), Some("/topic"));
    }

    #[test]
    fn legacy_schema_without_qos_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.db3");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(LEGACY_SCHEMA).unwrap();
        conn.execute("INSERT INTO topics VALUES (1, '/chatter', 'std_msgs/msg/String', 'cdr')", [])
            .unwrap();
        drop(conn);

        let store = opened(path);
        let topics = store.topics().unwrap();
        assert_eq!(topics.len(), 1);
        assert!(topics[0].offered_qos_profiles.is_empty());
    }

    #[test]
    fn empty_segment_reports_epoch_zero() {
        let dir = TempDir::new().unwrap();
        let store = opened(write_segment(&dir, "a.db3", &[]));
        assert_eq!(store.time_bounds().unwrap(), None);
        assert_eq!(store.time_range().unwrap(), (Timestamp::ZERO, Timestamp::ZERO));
        assert!(store.message_counts().unwrap().is_empty());
    }

    #[test]
    fn aggregates_time_range_and_counts() {
        let dir = TempDir::new().unwrap();
        let store = opened(write_segment(&dir, "a.db3", &[(1, 30), (3, 10), (1, 20), (3, 40)]));
        assert_eq!(
            store.time_range().unwrap(),
            (Timestamp::from_nanos(10), Timestamp::from_nanos(40))
        );
        let counts = store.message_counts().unwrap();
        assert_eq!(counts.get("/rosout"), Some(&2));
        assert_eq!(counts.get("/topic"), Some(&2));
        assert_eq!(counts.get("/parameter_events"), None);
    }

    #[test]
    fn scan_orders_by_timestamp_then_storage_order() {
        let dir = TempDir::new().unwrap();
        let store = opened(write_segment(&dir, "a.db3", &[(1, 30), (3, 10), (1, 10), (3, 20)]));
        assert_eq!(
            scan_timestamps(&store, &ScanPredicate::all()),
            vec![(3, 10), (1, 10), (3, 20), (1, 30)]
        );
    }

    #[test]
    fn scan_time_bounds_are_half_open() {
        let dir = TempDir::new().unwrap();
        let store = opened(write_segment(&dir, "a.db3", &[(1, 10), (1, 20), (1, 30), (1, 40)]));
        let both = ScanPredicate::all()
            .with_start(Timestamp::from_nanos(20))
            .with_end(Timestamp::from_nanos(40));
        assert_eq!(scan_timestamps(&store, &both), vec![(1, 20), (1, 30)]);

        let start_only = ScanPredicate::all().with_start(Timestamp::from_nanos(30));
        assert_eq!(scan_timestamps(&store, &start_only), vec![(1, 30), (1, 40)]);

        let end_only = ScanPredicate::all().with_end(Timestamp::from_nanos(20));
        assert_eq!(scan_timestamps(&store, &end_only), vec![(1, 10)]);
    }

    #[test]
    fn scan_topic_filters() {
        let dir = TempDir::new().unwrap();
        let store = opened(write_segment(&dir, "a.db3", &[(1, 10), (3, 20), (1, 30)]));

        let ids = store.resolve_topic_ids(["/topic"]).unwrap();
        assert_eq!(ids, vec![3]);
        let only_topic = ScanPredicate::all().with_topic_ids(ids);
        assert_eq!(scan_timestamps(&store, &only_topic), vec![(3, 20)]);

        let both = ScanPredicate::all().with_topic_ids(vec![1, 3]);
        assert_eq!(scan_timestamps(&store, &both).len(), 3);

        let unknown = store.resolve_topic_ids(["/does-not-exist"]).unwrap();
        assert!(unknown.is_empty());
        let none = ScanPredicate::all().with_topic_ids(unknown);
        assert!(scan_timestamps(&store, &none).is_empty());
    }

    #[test]
    fn abandoned_scan_releases_cursor() {
        let dir = TempDir::new().unwrap();
        let mut store = opened(write_segment(&dir, "a.db3", &[(1, 10), (1, 20), (1, 30)]));
        {
            let mut scan = store.scan(&ScanPredicate::all()).unwrap();
            let mut records = scan.records().unwrap();
            let first = records.next().unwrap().unwrap();
            assert_eq!(first.data, 10i64.to_le_bytes().to_vec());
        }
        store.close().unwrap();
    }
}
