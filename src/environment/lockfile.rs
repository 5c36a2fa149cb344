// src/environment/lockfile.rs

//! Explicit lock files
//!
//! A lock file starts with comment lines followed by the `@EXPLICIT`
//! marker; every following line is one package URL, optionally suffixed
//! with `#<hash>`.

use crate::error::{Error, Result};
use crate::resolver::PinnedReference;
use std::path::Path;
use tracing::info;

/// Marker line identifying an explicit lock file
pub const EXPLICIT_MARKER: &str = "@EXPLICIT";

/// How far into a document the marker is looked for
const MARKER_WINDOW: usize = 150;

/// Whether `content` is an explicit lock file
pub fn is_lock_file(content: &str) -> bool {
    let head: String = content.chars().take(MARKER_WINDOW).collect();
    head.split('\n').any(|line| line.trim() == EXPLICIT_MARKER)
}

/// Whether the file at `path` is an explicit lock file
pub fn is_lock_file_at(path: &Path) -> Result<bool> {
    Ok(is_lock_file(&std::fs::read_to_string(path)?))
}

/// Package lines of a lock file
pub fn package_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .skip_while(|line| line.trim() != EXPLICIT_MARKER)
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Lock file contents with one more package line
///
/// Existing bytes are kept; only trailing newlines are normalized so the
/// new line starts on its own line and the file ends with a newline.
pub fn append_line(content: &str, line: &str) -> String {
    let body = content.trim_end_matches(['\n', '\r']);
    format!("{}\n{}\n", body, line)
}

/// Append a pinned reference to the lock file at `path`
pub fn append_package(path: &Path, pinned: &PinnedReference) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    if !is_lock_file(&content) {
        return Err(Error::InvalidLockFile(path.to_path_buf()));
    }
    std::fs::write(path, append_line(&content, &pinned.to_string()))?;
    info!("Added {} to {}", pinned.name, path.display());
    Ok(())
}
