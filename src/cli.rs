use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rosbag2_sqlite::{TimeFormat, Timestamp};

#[derive(Parser)]
#[command(name = "rosbag2")]
#[command(about = "Inspect and dump rosbag2 SQLite bags", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Summarize a bag: topics, message counts and time range.
    Info {
        /// A `.db3` segment or a directory holding one or more segments.
        path: PathBuf,
        #[arg(long)]
        json: bool,
        /// JSON reader config file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Segment file extension used when PATH is a directory.
        #[arg(long)]
        ext: Option<String>,
    },

    /// Print messages as JSON lines in timestamp order.
    Cat {
        path: PathBuf,
        /// Only these topics (repeatable).
        #[arg(short, long = "topic")]
        topics: Vec<String>,
        /// Inclusive start, in decimal seconds.
        #[arg(long)]
        start: Option<Timestamp>,
        /// Exclusive end, in decimal seconds.
        #[arg(long)]
        end: Option<Timestamp>,
        /// sec_nanosec, sec_nsec or nanoseconds.
        #[arg(long)]
        time_format: Option<TimeFormat>,
        /// Stop after this many messages.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        ext: Option<String>,
    },
}
