use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{BagError, Result};

pub const DEFAULT_SEGMENT_EXTENSION: &str = "db3";

/// Recursively lists segment files under `root`, in file-name order within
/// each directory. The extension match ignores case and a leading dot.
pub fn discover_segments(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let wanted = extension.trim_start_matches('.');
    let mut segments = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|source| BagError::Discovery {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if has_extension(entry.path(), wanted) {
            segments.push(entry.into_path());
        }
    }
    debug!(root = %root.display(), count = segments.len(), "discovered segments");
    Ok(segments)
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}
