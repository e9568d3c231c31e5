//! Assemble command implementation
//!
//! Collects the per-line artifacts of a project in script order: one
//! combined subtitle timeline plus ffmpeg concat lists for the video and
//! audio clips. Lines without a successful media result are reported and
//! left out.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::path::Path;
use tracing::warn;

use reelforge_config::Config;
use reelforge_methods::{ffmpeg, srt};
use reelforge_project::Project;
use reelforge_utils::atomic_write::write_file_atomic;
use reelforge_utils::canonicalization::content_hash;
use reelforge_utils::error::ReelforgeError;
use reelforge_utils::exit_codes::ExitCode;
use reelforge_utils::paths::{project_dir, slugify};

use super::common::utf8_path;
use super::json_emit::emit_assemble_json;

/// Extensions that never count as a playable clip
const NON_CLIP_EXTENSIONS: &[&str] = &["srt", "txt", "json"];

/// Script-ordered artifacts of a project
#[derive(Debug, Default, PartialEq, Eq)]
struct Collected {
    videos: Vec<String>,
    audios: Vec<String>,
    subtitles: Vec<Utf8PathBuf>,
    missing: Vec<String>,
}

/// One written output file
#[derive(Debug, Serialize)]
struct WrittenFile {
    path: String,
    entries: usize,
    blake3: String,
}

#[derive(Debug, Serialize)]
struct AssembleOutput {
    project: String,
    out_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitles: Option<WrittenFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_list: Option<WrittenFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_list: Option<WrittenFile>,
    missing_lines: Vec<String>,
    missing_files: Vec<String>,
}

/// Execute `reelforge assemble`
pub fn execute_assemble_command(
    project_path: &Path,
    out: Option<&Path>,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let document = utf8_path(project_path)?;
    let project = reelforge_project::load(&document).map_err(ReelforgeError::from)?;
    let out_dir = match out {
        Some(dir) => utf8_path(dir)?,
        None => project_dir(&config.output_dir(), &project.name).join("assembled"),
    };

    let output = assemble(&project, &out_dir)?;

    if json {
        println!("{}", emit_assemble_json(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Assembled {} into {}", output.project, output.out_dir);
    for (label, file) in [
        ("subtitles", &output.subtitles),
        ("video list", &output.video_list),
        ("audio list", &output.audio_list),
    ] {
        if let Some(file) = file {
            println!("  {label:<11} {} ({} entries)", file.path, file.entries);
        }
    }
    if !output.missing_lines.is_empty() {
        println!("  Lines without media: {}", output.missing_lines.join(", "));
    }
    for path in &output.missing_files {
        println!("  Missing file: {path}");
    }
    if output.video_list.is_some() {
        println!(
            "Render with: ffmpeg -f concat -safe 0 -i {}/concat.txt -c copy out.mp4",
            output.out_dir
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn assemble(project: &Project, out_dir: &Utf8Path) -> Result<AssembleOutput> {
    let collected = collect(project);
    for id in &collected.missing {
        warn!(line = %id, "No successful media result, leaving line out");
    }

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create directory: {out_dir}"))?;

    let mut missing_files = Vec::new();
    let subtitles = if collected.subtitles.is_empty() {
        None
    } else {
        let target = out_dir.join(format!("{}.srt", slugify(&project.name)));
        let report = srt::combine_files(&collected.subtitles, &target)?;
        missing_files.extend(report.missing.iter().map(ToString::to_string));
        Some(written(&report.output, report.cues)?)
    };

    let video_list = write_list(&out_dir.join("concat.txt"), &collected.videos)?;
    let audio_list = write_list(&out_dir.join("audio.txt"), &collected.audios)?;

    Ok(AssembleOutput {
        project: project.name.clone(),
        out_dir: out_dir.to_string(),
        subtitles,
        video_list,
        audio_list,
        missing_lines: collected.missing,
        missing_files,
    })
}

fn collect(project: &Project) -> Collected {
    let mut collected = Collected::default();
    for line in &project.script {
        match line.generation.as_ref().filter(|g| g.ok) {
            Some(generation) => {
                if let Some(clip) = generation.artifacts.iter().find(|a| is_clip(a)) {
                    collected.videos.push(clip.clone());
                }
                collected.subtitles.extend(
                    generation
                        .artifacts
                        .iter()
                        .filter(|a| has_extension(a, "srt"))
                        .map(Utf8PathBuf::from),
                );
            }
            None => collected.missing.push(line.id.clone()),
        }
        if let Some(audio) = line.audio_generation.as_ref().filter(|g| g.ok)
            && let Some(path) = audio.artifacts.first()
        {
            collected.audios.push(path.clone());
        }
    }
    collected
}

fn write_list(path: &Utf8Path, entries: &[String]) -> Result<Option<WrittenFile>> {
    if entries.is_empty() {
        return Ok(None);
    }
    let absolute = entries
        .iter()
        .map(|entry| absolute_path(entry))
        .collect::<Result<Vec<_>>>()?;
    let content = ffmpeg::concat_list(absolute.iter().map(String::as_str));
    write_file_atomic(path, &content)
        .with_context(|| format!("Failed to write concat list: {path}"))?;
    Ok(Some(written(path, entries.len())?))
}

/// ffmpeg resolves relative entries against the list file, so lists hold
/// absolute paths
fn absolute_path(entry: &str) -> Result<String> {
    let absolute = std::path::absolute(entry)
        .with_context(|| format!("Failed to resolve artifact path: {entry}"))?;
    Ok(absolute.to_string_lossy().into_owned())
}

fn written(path: &Utf8Path, entries: usize) -> Result<WrittenFile> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read back: {path}"))?;
    Ok(WrittenFile {
        path: path.to_string(),
        entries,
        blake3: content_hash(&bytes),
    })
}

fn extension(path: &str) -> Option<String> {
    Utf8Path::new(path).extension().map(str::to_ascii_lowercase)
}

fn has_extension(path: &str, wanted: &str) -> bool {
    extension(path).as_deref() == Some(wanted)
}

fn is_clip(path: &str) -> bool {
    extension(path).is_some_and(|ext| !NON_CLIP_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_method_api::GenerationResult;
    use tempfile::TempDir;

    fn srt_file(dir: &Utf8Path, name: &str, text: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("1\n00:00:00,000 --> 00:00:02,000\n{text}\n")).unwrap();
        path.to_string()
    }

    #[test]
    fn test_collect_orders_and_reports_missing() {
        let mut project = Project::from_texts("demo", ["One", "Two", "Three"]);
        project.script[0].generation = Some(GenerationResult::success(["a/L1.mp4", "a/L1.srt"]));
        project.script[0].audio_generation = Some(GenerationResult::success(["a/L1.wav"]));
        project.script[1].generation = Some(GenerationResult::failure("quota_exceeded"));
        project.script[2].generation = Some(GenerationResult::success(["a/L3.srt"]));

        let collected = collect(&project);
        assert_eq!(collected.videos, vec!["a/L1.mp4"]);
        assert_eq!(collected.audios, vec!["a/L1.wav"]);
        assert_eq!(
            collected.subtitles,
            vec![Utf8PathBuf::from("a/L1.srt"), Utf8PathBuf::from("a/L3.srt")]
        );
        assert_eq!(collected.missing, vec!["L2"]);
    }

    #[test]
    fn test_assemble_writes_timeline_and_lists() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let first = srt_file(&root, "L1.srt", "One");
        let second = srt_file(&root, "L2.srt", "Two");

        let mut project = Project::from_texts("My Demo", ["One", "Two"]);
        let clip = root.join("L1.mp4").to_string();
        project.script[0].generation = Some(GenerationResult::success([clip.clone(), first]));
        project.script[1].generation = Some(GenerationResult::success([second]));

        let out_dir = root.join("assembled");
        let output = assemble(&project, &out_dir).unwrap();

        let subtitles = output.subtitles.unwrap();
        assert_eq!(subtitles.entries, 2);
        assert!(subtitles.path.ends_with("my-demo.srt"));
        let combined = std::fs::read_to_string(&subtitles.path).unwrap();
        assert!(combined.contains("00:00:02,000 --> 00:00:04,000"));

        let video_list = output.video_list.unwrap();
        assert_eq!(video_list.entries, 1);
        assert_eq!(video_list.blake3.len(), 64);
        let list = std::fs::read_to_string(out_dir.join("concat.txt")).unwrap();
        assert_eq!(list, format!("file '{clip}'\n"));

        assert!(output.audio_list.is_none());
        assert!(output.missing_lines.is_empty());
    }

    #[test]
    fn test_clip_detection() {
        assert!(is_clip("out/L1.mp4"));
        assert!(is_clip("out/L1.PNG"));
        assert!(!is_clip("out/L1.srt"));
        assert!(!is_clip("out/L1.txt"));
        assert!(!is_clip("out/noext"));
    }
}
