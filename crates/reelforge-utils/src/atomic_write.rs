//! Atomic file operations
//!
//! Writes go to a temporary file in the target directory, are fsynced, then
//! renamed over the target. Readers therefore observe either the previous
//! document or the complete new one, never a torn write. When the rename
//! crosses filesystems the content is copied into a second temporary file next
//! to the target and that one is renamed instead.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Result of an atomic write operation
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteResult {
    /// Bytes written to the target
    pub bytes_written: usize,
    /// Whether cross-filesystem fallback was used
    pub used_cross_filesystem_fallback: bool,
    /// Any warnings generated during the operation
    pub warnings: Vec<String>,
}

/// Atomically write UTF-8 content to a file using temp file + fsync + rename.
///
/// Line endings are normalized to LF.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let normalized = normalize_line_endings(content);
    write_bytes_atomic(path.as_std_path(), normalized.as_bytes())
}

/// Atomically write raw bytes to a file using temp file + fsync + rename.
pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<AtomicWriteResult> {
    let mut result = AtomicWriteResult {
        bytes_written: content.len(),
        ..AtomicWriteResult::default()
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in: {}", parent.display()))?;

    temp_file
        .write_all(content)
        .with_context(|| "Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .with_context(|| "Failed to fsync temporary file")?;

    let temp_path = temp_file.path().to_path_buf();

    match temp_file.persist(path) {
        Ok(_) => {}
        Err(e) if is_cross_filesystem_error(&e.error) => {
            result.used_cross_filesystem_fallback = true;
            result
                .warnings
                .push("Used cross-filesystem fallback (copy→fsync→replace)".to_string());
            cross_filesystem_copy(&temp_path, path)?;
        }
        Err(e) => {
            return Err(anyhow::anyhow!(e.error))
                .with_context(|| format!("Failed to atomically write file: {}", path.display()));
        }
    }

    Ok(result)
}

/// Normalize line endings to LF
fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(unix)]
fn is_cross_filesystem_error(err: &std::io::Error) -> bool {
    // EXDEV on Linux/macOS
    err.raw_os_error() == Some(18)
}

#[cfg(not(unix))]
fn is_cross_filesystem_error(_err: &std::io::Error) -> bool {
    false
}

fn cross_filesystem_copy(temp_path: &Path, target: &Path) -> Result<()> {
    let content = fs::read(temp_path)
        .with_context(|| "Failed to read temporary file for cross-filesystem copy")?;

    let target_dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut target_temp = NamedTempFile::new_in(target_dir).with_context(|| {
        format!(
            "Failed to create temp file in target directory: {}",
            target_dir.display()
        )
    })?;
    target_temp.write_all(&content)?;
    target_temp.as_file().sync_all()?;
    target_temp
        .persist(target)
        .map_err(|e| anyhow::anyhow!(e.error))
        .with_context(|| "Failed to persist during cross-filesystem copy")?;

    let _ = fs::remove_file(temp_path);
    Ok(())
}
