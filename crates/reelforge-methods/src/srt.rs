//! SubRip subtitle helpers.
//!
//! Times are kept in whole milliseconds. Combining shifts every file by the
//! latest end time of the files before it, so per-line subtitle files become
//! one continuous timeline in script order.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;
use tracing::{debug, warn};

use reelforge_utils::atomic_write::write_file_atomic;

static BLOCK_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("block separator pattern is valid"));

static TIMING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2,}:\d{2}:\d{2}[,.]\d{3})\s*-->\s*(\d{2,}:\d{2}:\d{2}[,.]\d{3})")
        .expect("timing pattern is valid")
});

/// One subtitle entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrtCue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// `HH:MM:SS,mmm` for a millisecond offset
#[must_use]
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Millisecond offset of an `HH:MM:SS,mmm` timestamp (`.` is accepted as
/// the decimal separator)
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<u64> {
    let (hms, millis) = value.trim().split_once([',', '.'])?;
    let mut parts = hms.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 || millis.len() != 3 {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;
    Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis)
}

/// Render cues as a SubRip document, numbered from 1
#[must_use]
pub fn render(cues: &[SrtCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start_ms),
            format_timestamp(cue.end_ms),
            cue.text
        );
    }
    out
}

/// Single-cue document covering `duration_ms` from zero
#[must_use]
pub fn cue_for_line(text: &str, duration_ms: u64) -> String {
    render(&[SrtCue {
        start_ms: 0,
        end_ms: duration_ms,
        text: text.trim().to_string(),
    }])
}

/// Parse a SubRip document; malformed blocks are skipped
#[must_use]
pub fn parse(content: &str) -> Vec<SrtCue> {
    let normalized = content.replace("\r\n", "\n");
    BLOCK_SEPARATOR
        .split(normalized.trim())
        .filter_map(|block| {
            let lines: Vec<&str> = block.trim().lines().collect();
            // Index line, timing line, then text
            let timing = TIMING.captures(lines.get(1)?)?;
            let start_ms = parse_timestamp(timing.get(1)?.as_str())?;
            let end_ms = parse_timestamp(timing.get(2)?.as_str())?;
            Some(SrtCue {
                start_ms,
                end_ms,
                text: lines[2..].join("\n"),
            })
        })
        .collect()
}

/// Concatenate documents into one timeline
#[must_use]
pub fn combine<'a, I>(documents: I) -> Vec<SrtCue>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut combined = Vec::new();
    let mut offset = 0;
    for document in documents {
        let cues = parse(document);
        let local_end = cues.iter().map(|c| c.end_ms).max().unwrap_or(0);
        combined.extend(cues.into_iter().map(|cue| SrtCue {
            start_ms: cue.start_ms + offset,
            end_ms: cue.end_ms + offset,
            text: cue.text,
        }));
        offset += local_end;
    }
    combined
}

/// Outcome of [`combine_files`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineReport {
    pub output: Utf8PathBuf,
    pub cues: usize,
    pub missing: Vec<Utf8PathBuf>,
}

/// Combine subtitle files in the given order into `output`.
///
/// Missing inputs are reported and skipped.
pub fn combine_files(inputs: &[Utf8PathBuf], output: &Utf8Path) -> Result<CombineReport> {
    let mut documents = Vec::new();
    let mut missing = Vec::new();
    for path in inputs {
        if !path.exists() {
            warn!(path = %path, "Subtitle file missing, skipping");
            missing.push(path.clone());
            continue;
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read subtitle file: {path}"))?;
        documents.push(content);
    }

    let cues = combine(documents.iter().map(String::as_str));
    write_file_atomic(output, &render(&cues))
        .with_context(|| format!("Failed to write combined subtitles: {output}"))?;
    debug!(output = %output, cues = cues.len(), "Combined subtitles");

    Ok(CombineReport {
        output: output.to_path_buf(),
        cues: cues.len(),
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_timestamps() {
        assert_eq!(format_timestamp(0), "00:00:00,000");
        assert_eq!(format_timestamp(3_723_045), "01:02:03,045");
        assert_eq!(parse_timestamp("01:02:03,045"), Some(3_723_045));
        assert_eq!(parse_timestamp("00:00:04.500"), Some(4500));
        assert_eq!(parse_timestamp("00:61:00,000"), None);
        assert_eq!(parse_timestamp("00:00:01,5"), None);
        assert_eq!(parse_timestamp("garbage"), None);
    }

    #[test]
    fn test_cue_for_line() {
        assert_eq!(
            cue_for_line("  Hello there ", 4000),
            "1\n00:00:00,000 --> 00:00:04,000\nHello there\n\n"
        );
    }

    #[test]
    fn test_parse_skips_malformed_blocks() {
        let doc = "1\r\n00:00:00,000 --> 00:00:01,000\r\nfirst\r\nsecond line\r\n\r\n\
                   2\nnot a timing\ntext\n\n\
                   3\n00:00:01,000 --> 00:00:02,500\nthird\n";
        let cues = parse(doc);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "first\nsecond line");
        assert_eq!(cues[1].end_ms, 2500);
    }

    #[test]
    fn test_combine_offsets_by_previous_end() {
        let a = cue_for_line("A", 4000);
        let b = "1\n00:00:00,000 --> 00:00:01,000\nB1\n\n2\n00:00:01,000 --> 00:00:03,000\nB2\n";
        let c = cue_for_line("C", 2000);

        let cues = combine([a.as_str(), b, c.as_str()]);
        let spans: Vec<(u64, u64)> = cues.iter().map(|c| (c.start_ms, c.end_ms)).collect();
        assert_eq!(spans, vec![(0, 4000), (4000, 5000), (5000, 7000), (7000, 9000)]);
        assert!(render(&cues).starts_with("1\n00:00:00,000 --> 00:00:04,000\nA\n\n2\n"));
    }

    #[test]
    fn test_combine_files_reports_missing() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let first = root.join("L1.srt");
        std::fs::write(&first, cue_for_line("A", 1000)).unwrap();
        let absent = root.join("L2.srt");

        let report = combine_files(&[first, absent.clone()], &root.join("full.srt")).unwrap();
        assert_eq!(report.cues, 1);
        assert_eq!(report.missing, vec![absent]);
        assert!(root.join("full.srt").exists());
    }
}
