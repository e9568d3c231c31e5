//! Helpers shared by the command implementations

use anyhow::{Result, anyhow};
use camino::Utf8PathBuf;
use std::path::Path;

/// Convert a CLI path argument to UTF-8
pub fn utf8_path(path: &Path) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|p| anyhow!("Path is not valid UTF-8: {}", p.display()))
}

/// Shorten `text` to `max` characters for table output
pub fn truncate(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer message", 8), "a longe…");
        assert_eq!(truncate("这是一个很长的句子", 5), "这是一个…");
    }
}
