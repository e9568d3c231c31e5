//! Thin wrapper over the `ffmpeg` binary.
//!
//! Arguments are always passed argv-style; nothing goes through a shell.

use camino::Utf8Path;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const STDERR_TAIL_CHARS: usize = 500;

/// Located ffmpeg executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    /// Find `configured` (a name or path) or `ffmpeg` on `PATH`.
    ///
    /// # Errors
    ///
    /// A message suitable for `meta.error` when the binary cannot be found.
    pub fn locate(configured: Option<&str>) -> Result<Self, String> {
        let name = configured.unwrap_or("ffmpeg");
        which::which(name)
            .map(|program| Self { program })
            .map_err(|e| format!("ffmpeg not found ('{name}'): {e}"))
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run with `args`, killing the process after `timeout`.
    ///
    /// # Errors
    ///
    /// A message with the tail of stderr when ffmpeg exits non-zero, cannot
    /// be spawned or overruns the timeout.
    pub async fn run(&self, args: &[OsString], timeout: Duration) -> Result<(), String> {
        debug!(program = %self.program.display(), args = ?args, "Running ffmpeg");
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Err(_) => return Err(format!("ffmpeg timed out after {}s", timeout.as_secs())),
            Ok(Err(e)) => return Err(format!("failed to start ffmpeg: {e}")),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("ffmpeg failed ({}): {}", output.status, tail(&stderr)))
        }
    }
}

fn tail(text: &str) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect()
    }
}

/// Escape a path for use as an option value inside an ffmpeg filter graph
#[must_use]
pub fn escape_filter_value(path: &Utf8Path) -> String {
    let mut out = String::with_capacity(path.as_str().len());
    for c in path.as_str().chars() {
        if matches!(c, '\\' | '\'' | ':' | ',' | ';' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Contents of an ffmpeg concat demuxer list for `paths`, in order
#[must_use]
pub fn concat_list<'a, I>(paths: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    paths
        .into_iter()
        .map(|p| format!("file '{}'\n", p.replace('\'', r"'\''")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_quotes_paths() {
        let list = concat_list(["/out/L1/L1.mp4", "/out/it's/L2.mp4"]);
        assert_eq!(
            list,
            "file '/out/L1/L1.mp4'\nfile '/out/it'\\''s/L2.mp4'\n"
        );
        assert_eq!(concat_list(std::iter::empty::<&str>()), "");
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(
            escape_filter_value(Utf8Path::new("C:/fonts/a'b.ttf")),
            r"C\:/fonts/a\'b.ttf"
        );
    }

    #[test]
    fn test_locate_missing_binary() {
        let err = Ffmpeg::locate(Some("reelforge-no-such-ffmpeg")).unwrap_err();
        assert!(err.contains("reelforge-no-such-ffmpeg"));
    }

    #[test]
    fn test_tail_keeps_end() {
        let long = "x".repeat(600) + "END";
        let t = tail(&long);
        assert_eq!(t.chars().count(), STDERR_TAIL_CHARS);
        assert!(t.ends_with("END"));
    }
}
