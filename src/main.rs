mod cli;

use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::Path;

use chrono::SecondsFormat;
use clap::Parser;
use rosbag2_sqlite::{BagError, BagReader, ReadOptions, ReaderConfig, TimeFormat, Timestamp, load_reader_config};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[derive(Serialize)]
struct TopicSummary {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    serialization_format: String,
    messages: u64,
    qos_profiles: usize,
}

#[derive(Serialize)]
struct InfoReport {
    path: String,
    segments: Vec<String>,
    start: Timestamp,
    end: Timestamp,
    start_utc: Option<String>,
    end_utc: Option<String>,
    duration_seconds: f64,
    messages: u64,
    topics: Vec<TopicSummary>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Info {
            path,
            json,
            config,
            ext,
        } => {
            let config = resolve_config(config.as_deref(), ext, None)?;
            let mut bag = open_bag(&path, &config)?;
            let report = build_info(&path, &bag)?;
            bag.close()?;

            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            match write_info(&mut out, &report, json).and_then(|()| out.flush()) {
                Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => Ok(other?),
            }
        }

        Command::Cat {
            path,
            topics,
            start,
            end,
            time_format,
            limit,
            config,
            ext,
        } => {
            let config = resolve_config(config.as_deref(), ext, time_format)?;
            let mut bag = open_bag(&path, &config)?;

            let mut options = ReadOptions::new();
            if let Some(start) = start {
                options = options.start_time(start);
            }
            if let Some(end) = end {
                options = options.end_time(end);
            }
            if !topics.is_empty() {
                options = options.topics(topics);
            }

            let result = write_messages(&bag, &options, config.time_format, limit);
            bag.close()?;
            match result {
                Err(err) if is_broken_pipe(err.as_ref()) => Ok(()),
                other => other,
            }
        }
    }
}

fn resolve_config(
    path: Option<&Path>,
    ext: Option<String>,
    time_format: Option<TimeFormat>,
) -> Result<ReaderConfig, BagError> {
    let mut config = match path {
        Some(path) => load_reader_config(path)?,
        None => ReaderConfig::default(),
    };
    if let Some(ext) = ext {
        config.segment_extension = ext;
    }
    if let Some(time_format) = time_format {
        config.time_format = time_format;
    }
    Ok(config)
}

fn open_bag(path: &Path, config: &ReaderConfig) -> Result<BagReader, BagError> {
    if path.is_dir() {
        BagReader::open_directory(path, config)
    } else {
        BagReader::open_file(path, config)
    }
}

fn build_info(path: &Path, bag: &BagReader) -> Result<InfoReport, BagError> {
    let counts = bag.message_counts()?;
    let (start, end) = bag.time_range()?;
    let topics = bag
        .read_topics()?
        .iter()
        .map(|topic| TopicSummary {
            name: topic.name.clone(),
            type_name: topic.type_name.clone(),
            serialization_format: topic.serialization_format.clone(),
            messages: counts.get(&topic.name).copied().unwrap_or(0),
            qos_profiles: topic.offered_qos_profiles.len(),
        })
        .collect();

    Ok(InfoReport {
        path: path.display().to_string(),
        segments: bag.segment_paths().map(|p| p.display().to_string()).collect(),
        start,
        end,
        start_utc: rfc3339(start),
        end_utc: rfc3339(end),
        duration_seconds: end.to_nanos().saturating_sub(start.to_nanos()) as f64 / 1e9,
        messages: counts.values().sum(),
        topics,
    })
}

fn rfc3339(stamp: Timestamp) -> Option<String> {
    stamp
        .to_datetime()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

fn write_info(out: &mut impl Write, report: &InfoReport, json: bool) -> io::Result<()> {
    if json {
        let text = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
        return writeln!(out, "{text}");
    }
    writeln!(out, "path: {}", report.path)?;
    writeln!(out, "segments: {}", report.segments.len())?;
    for segment in &report.segments {
        writeln!(out, "  {segment}")?;
    }
    writeln!(out, "duration: {:.3}s", report.duration_seconds)?;
    writeln!(
        out,
        "start: {} ({})",
        report.start_utc.as_deref().unwrap_or("-"),
        report.start
    )?;
    writeln!(out, "end: {} ({})", report.end_utc.as_deref().unwrap_or("-"), report.end)?;
    writeln!(out, "messages: {}", report.messages)?;
    writeln!(out, "topics: {}", report.topics.len())?;
    for topic in &report.topics {
        writeln!(
            out,
            "  {} | {} | {} | {} msgs | {} qos",
            topic.name, topic.type_name, topic.serialization_format, topic.messages, topic.qos_profiles
        )?;
    }
    Ok(())
}

fn write_messages(
    bag: &BagReader,
    options: &ReadOptions,
    time_format: TimeFormat,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut query = bag.read_messages(options)?;

    for message in query.messages()?.take(limit.unwrap_or(usize::MAX)) {
        let message = message?;
        let mut line = serde_json::json!({
            "topic": message.topic_name(),
            "timestamp": time_format.render(message.timestamp()),
            "size": message.data().len(),
        });
        match message.value() {
            Ok(value) => line["value"] = value.clone(),
            Err(err) => {
                tracing::debug!(topic = message.topic_name(), %err, "decode failed");
                line["error"] = serde_json::Value::from(err.to_string());
            }
        }
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

fn is_broken_pipe(err: &(dyn std::error::Error + 'static)) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|err| err.kind() == ErrorKind::BrokenPipe)
}
