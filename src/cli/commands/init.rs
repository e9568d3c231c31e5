//! Init command implementation
//!
//! Authors a fresh project document from plain text, one narration line per
//! input line. Blank lines are dropped and ids are assigned by position.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Read;
use std::path::Path;

use reelforge_project::Project;
use reelforge_utils::error::{ConfigError, ReelforgeError};
use reelforge_utils::exit_codes::ExitCode;
use reelforge_utils::paths::slugify;

use super::common::utf8_path;

/// Execute `reelforge init`
pub fn execute_init_command(
    name: &str,
    out: &Path,
    from: Option<&Path>,
    force: bool,
) -> Result<ExitCode> {
    let text = match from {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script text: {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read script text from stdin")?;
            buffer
        }
    };

    let (path, lines) = create_project(name, &utf8_path(out)?, &text, force)?;
    println!("Created {path} with {lines} lines");
    println!("Next: reelforge run {path}");
    Ok(ExitCode::SUCCESS)
}

/// Write a new document for `text` into `dir`, returning its path and
/// line count
fn create_project(
    name: &str,
    dir: &Utf8Path,
    text: &str,
    force: bool,
) -> Result<(Utf8PathBuf, usize)> {
    if name.trim().is_empty() {
        return Err(invalid("name", name).into());
    }

    let project = Project::from_texts(name.trim(), text.lines());
    if project.script.is_empty() {
        return Err(invalid("script", "no non-empty lines in input").into());
    }

    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {dir}"))?;
    let path = dir.join(format!("{}.json", slugify(name)));
    if path.exists() && !force {
        return Err(invalid(
            "out",
            &format!("{path} already exists (use --force to overwrite)"),
        )
        .into());
    }

    reelforge_project::save(&project, &path).map_err(ReelforgeError::from)?;
    Ok((path, project.script.len()))
}

fn invalid(key: &str, value: &str) -> ReelforgeError {
    ReelforgeError::Config(ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
