//! Fixture bags for integration tests.
//!
//! Segments are written with the rosbag2 SQLite schema and CDR payloads that
//! mirror a short `talker` recording: ten `/rosout` log lines and ten
//! `/topic` strings, plus a `/parameter_events` topic with no messages.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rosbag2_sqlite::Timestamp;
use rusqlite::{Connection, params};

pub const BAG_START: Timestamp = Timestamp {
    sec: 1_585_866_235,
    nsec: 112_411_371,
};
pub const BAG_END: Timestamp = Timestamp {
    sec: 1_585_866_239,
    nsec: 643_508_139,
};
pub const TOPICS: [&str; 2] = ["/rosout", "/topic"];
pub const DATATYPES: [&str; 2] = ["rcl_interfaces/msg/Log", "std_msgs/msg/String"];

pub const PUBLISH_PERIOD_NS: i64 = 500_000_000;
/// Delay between a log line and the string it announces.
pub const TOPIC_DELAY_NS: i64 = 31_096_768;
/// Delay between the log stamp and its recording time.
pub const LOG_LATENCY_NS: i64 = 280_683;

pub const LOG_FILE: &str = "/opt/ros2_ws/eloquent/src/ros2/examples/rclcpp/minimal_publisher/lambda.cpp";

const SCHEMA: &str = "
    CREATE TABLE topics(id INTEGER PRIMARY KEY, name TEXT NOT NULL, type TEXT NOT NULL,
                        serialization_format TEXT NOT NULL, offered_qos_profiles TEXT NOT NULL);
    CREATE TABLE messages(id INTEGER PRIMARY KEY, topic_id INTEGER NOT NULL,
                          timestamp INTEGER NOT NULL, data BLOB NOT NULL);
    CREATE INDEX timestamp_idx ON messages (timestamp ASC);";

const QOS: &str = "- history: 3
  depth: 0
  reliability: 1
  durability: 2
  deadline:
    sec: 2147483647
    nsec: 4294967295
  lifespan:
    sec: 2147483647
    nsec: 4294967295
  liveliness: 1
  liveliness_lease_duration:
    sec: 2147483647
    nsec: 4294967295
  avoid_ros_namespace_conventions: false
";

#[derive(Debug, Clone)]
pub struct TopicRow {
    pub id: i64,
    pub name: &'static str,
    pub type_name: &'static str,
    pub format: &'static str,
}

impl TopicRow {
    pub const fn new(id: i64, name: &'static str, type_name: &'static str) -> Self {
        Self {
            id,
            name,
            type_name,
            format: "cdr",
        }
    }
}

/// One recorded message, addressed by topic name so it can be written into
/// segments whose catalogs number topics differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub topic: &'static str,
    pub timestamp: i64,
    pub data: Vec<u8>,
}

pub fn talker_catalog() -> Vec<TopicRow> {
    vec![
        TopicRow::new(1, "/rosout", "rcl_interfaces/msg/Log"),
        TopicRow::new(2, "/parameter_events", "rcl_interfaces/msg/ParameterEvent"),
        TopicRow::new(3, "/topic", "std_msgs/msg/String"),
    ]
}

/// Same topics, numbered differently.
pub fn shuffled_talker_catalog() -> Vec<TopicRow> {
    vec![
        TopicRow::new(1, "/topic", "std_msgs/msg/String"),
        TopicRow::new(2, "/rosout", "rcl_interfaces/msg/Log"),
        TopicRow::new(3, "/parameter_events", "rcl_interfaces/msg/ParameterEvent"),
    ]
}

pub fn rosout_time(i: i64) -> i64 {
    BAG_START.to_nanos() + i * PUBLISH_PERIOD_NS
}

pub fn topic_time(i: i64) -> i64 {
    rosout_time(i) + TOPIC_DELAY_NS
}

/// The twenty talker messages in recording order.
pub fn talker_messages() -> Vec<Recorded> {
    let mut out = Vec::with_capacity(20);
    for i in 0..10 {
        let stamp = Timestamp::from_nanos(rosout_time(i) - LOG_LATENCY_NS);
        out.push(Recorded {
            topic: "/rosout",
            timestamp: rosout_time(i),
            data: log_payload(stamp, &format!("Publishing: 'Hello, world! {i}'")),
        });
        out.push(Recorded {
            topic: "/topic",
            timestamp: topic_time(i),
            data: string_payload(&format!("Hello, world! {i}")),
        });
    }
    out
}

pub fn write_segment(path: &Path, catalog: &[TopicRow], messages: &[Recorded]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    for row in catalog {
        conn.execute(
            "INSERT INTO topics (id, name, type, serialization_format, offered_qos_profiles)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.id, row.name, row.type_name, row.format, QOS],
        )
        .unwrap();
    }
    for message in messages {
        let topic_id = catalog
            .iter()
            .find(|row| row.name == message.topic)
            .map_or(99, |row| row.id);
        conn.execute(
            "INSERT INTO messages (topic_id, timestamp, data) VALUES (?1, ?2, ?3)",
            params![topic_id, message.timestamp, message.data],
        )
        .unwrap();
    }
}

/// `<dir>/talker/talker.db3` holding the whole recording.
pub fn write_talker_file(dir: &Path) -> PathBuf {
    let bag_dir = dir.join("talker");
    fs::create_dir_all(&bag_dir).unwrap();
    let path = bag_dir.join("talker.db3");
    write_segment(&path, &talker_catalog(), &talker_messages());
    path
}

/// The same recording split by time into two segments, the way the
/// recorder rotates files, plus a metadata file discovery must skip.
pub fn write_split_talker_dir(dir: &Path) -> PathBuf {
    let bag_dir = dir.join("talker_split");
    fs::create_dir_all(&bag_dir).unwrap();
    let messages = talker_messages();
    let (first, second) = messages.split_at(9);
    write_segment(&bag_dir.join("talker_0.db3"), &talker_catalog(), first);
    write_segment(&bag_dir.join("talker_1.db3"), &shuffled_talker_catalog(), second);
    fs::write(bag_dir.join("metadata.yaml"), "rosbag2_bagfile_information:\n  version: 4\n").unwrap();
    bag_dir
}

/// The recording split by topic, so the two segments overlap in time.
pub fn write_interleaved_talker_dir(dir: &Path) -> PathBuf {
    let bag_dir = dir.join("talker_interleaved");
    fs::create_dir_all(&bag_dir).unwrap();
    let (rosout, topic): (Vec<Recorded>, Vec<Recorded>) =
        talker_messages().into_iter().partition(|m| m.topic == "/rosout");
    write_segment(&bag_dir.join("a.db3"), &shuffled_talker_catalog(), &topic);
    write_segment(&bag_dir.join("b.db3"), &talker_catalog(), &rosout);
    bag_dir
}

pub fn log_payload(stamp: Timestamp, msg: &str) -> Vec<u8> {
    let mut w = CdrWriter::new();
    w.i32(stamp.sec as i32);
    w.u32(stamp.nsec);
    w.u8(20);
    w.string("minimal_publisher");
    w.string(msg);
    w.string(LOG_FILE);
    w.string("operator()");
    w.u32(38);
    w.finish()
}

pub fn string_payload(data: &str) -> Vec<u8> {
    let mut w = CdrWriter::new();
    w.string(data);
    w.finish()
}

/// Little-endian plain CDR encoder.
pub struct CdrWriter {
    buf: Vec<u8>,
}

impl CdrWriter {
    pub fn new() -> Self {
        Self {
            buf: vec![0x00, 0x01, 0x00, 0x00],
        }
    }

    fn align(&mut self, size: usize) {
        while (self.buf.len() - 4) % size != 0 {
            self.buf.push(0);
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u32(&mut self, v: u32) {
        self.align(4);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.align(4);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn string(&mut self, s: &str) {
        self.u32(s.len() as u32 + 1);
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
