use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::discovery::DEFAULT_SEGMENT_EXTENSION;
use crate::error::{BagError, Result};
use crate::time::TimeFormat;

/// Reader settings, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub time_format: TimeFormat,
    /// Extension of segment files picked up by directory discovery.
    pub segment_extension: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            time_format: TimeFormat::default(),
            segment_extension: DEFAULT_SEGMENT_EXTENSION.to_string(),
        }
    }
}

/// A missing file means defaults. Anything unreadable or malformed is an error.
pub fn load_reader_config(path: &Path) -> Result<ReaderConfig> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ReaderConfig::default()),
        Err(err) => {
            return Err(BagError::Config {
                path: path.to_path_buf(),
                reason: err.to_string(),
            });
        }
    };
    if data.trim().is_empty() {
        return Ok(ReaderConfig::default());
    }
    serde_json::from_str(&data).map_err(|err| BagError::Config {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}
