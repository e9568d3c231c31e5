//! JSON document form of a [`Project`].
//!
//! Documents are written in canonical form: sorted keys, two-space
//! indentation, trailing newline. Loading validates the structure and
//! refuses anything the engine could not safely resume from.

use camino::Utf8Path;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

use reelforge_utils::atomic_write::write_file_atomic;
use reelforge_utils::canonicalization::to_canonical_pretty;
use reelforge_utils::error::{CorruptProjectError, ProjectError};

use crate::model::{Project, REGENERATE_STATUS, ScriptLine, derived_id};

const KEY_PROJECT: &str = "project";
const KEY_SCRIPT: &str = "script";
const KEY_CREATED_AT: &str = "created_at";
const KEY_UPDATED_AT: &str = "updated_at";
const KEY_STATUS: &str = "status";
const KEY_ID: &str = "id";

#[derive(Serialize)]
struct LineOut<'a> {
    status: String,
    #[serde(flatten)]
    line: &'a ScriptLine,
}

#[derive(Serialize)]
struct DocumentOut<'a> {
    project: &'a str,
    script: Vec<LineOut<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<&'a str>,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, Value>,
}

fn corrupt(path: &str, reason: impl Into<String>) -> ProjectError {
    ProjectError::Corrupt(CorruptProjectError {
        path: path.to_string(),
        reason: reason.into(),
    })
}

/// Parse and validate a project document.
///
/// `origin` names the document in error messages.
///
/// # Errors
///
/// `ProjectError::Corrupt` on invalid JSON, a missing or empty `project`,
/// a missing `script`, empty line text, duplicate ids, a stage result
/// without a decision, or a successful result without artifacts.
pub fn parse(content: &str, origin: &str) -> Result<Project, ProjectError> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| corrupt(origin, format!("invalid JSON: {e}")))?;
    let Value::Object(mut root) = value else {
        return Err(corrupt(origin, "document is not a JSON object"));
    };

    let name = match root.remove(KEY_PROJECT) {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        Some(Value::String(_)) => return Err(corrupt(origin, "'project' is empty")),
        Some(_) => return Err(corrupt(origin, "'project' is not a string")),
        None => return Err(corrupt(origin, "missing 'project'")),
    };

    let lines = match root.remove(KEY_SCRIPT) {
        Some(Value::Array(lines)) => lines,
        Some(_) => return Err(corrupt(origin, "'script' is not an array")),
        None => return Err(corrupt(origin, "missing 'script'")),
    };

    let created_at = take_optional_string(&mut root, KEY_CREATED_AT, origin)?;
    let updated_at = take_optional_string(&mut root, KEY_UPDATED_AT, origin)?;

    let mut script = Vec::with_capacity(lines.len());
    let mut seen = HashSet::new();
    for (position, raw) in lines.into_iter().enumerate() {
        let line = parse_line(raw, position, origin)?;
        if !seen.insert(line.id.clone()) {
            return Err(corrupt(origin, format!("duplicate line id '{}'", line.id)));
        }
        script.push(line);
    }

    Ok(Project {
        name,
        script,
        created_at,
        updated_at,
        extra: root.into_iter().collect(),
    })
}

fn take_optional_string(
    root: &mut Map<String, Value>,
    key: &str,
    origin: &str,
) -> Result<Option<String>, ProjectError> {
    match root.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(corrupt(origin, format!("'{key}' is not a string"))),
    }
}

fn parse_line(raw: Value, position: usize, origin: &str) -> Result<ScriptLine, ProjectError> {
    let at = position + 1;
    let Value::Object(mut fields) = raw else {
        return Err(corrupt(origin, format!("script entry {at} is not an object")));
    };

    let regenerate = matches!(
        fields.remove(KEY_STATUS),
        Some(Value::String(s)) if s == REGENERATE_STATUS
    );
    match fields.get(KEY_ID) {
        None | Some(Value::Null) => {
            fields.insert(KEY_ID.to_string(), Value::String(derived_id(position)));
        }
        Some(Value::String(id)) if id.trim().is_empty() => {
            return Err(corrupt(origin, format!("script entry {at} has an empty id")));
        }
        _ => {}
    }

    let mut line: ScriptLine = serde_json::from_value(Value::Object(fields))
        .map_err(|e| corrupt(origin, format!("script entry {at}: {e}")))?;
    line.regenerate = regenerate;

    validate_line(&line).map_err(|reason| corrupt(origin, format!("line '{}': {reason}", line.id)))?;
    Ok(line)
}

fn validate_line(line: &ScriptLine) -> Result<(), String> {
    if line.text.trim().is_empty() {
        return Err("text is empty".to_string());
    }

    if let Some(decision) = &line.decision {
        if decision.method.trim().is_empty() {
            return Err("decision has an empty method".to_string());
        }
        if !(0.0..=1.0).contains(&decision.confidence) {
            return Err(format!(
                "decision confidence {} is outside 0..=1",
                decision.confidence
            ));
        }
    }

    for (field, result) in [
        ("generation", &line.generation),
        ("audioGeneration", &line.audio_generation),
    ] {
        let Some(result) = result else { continue };
        if line.decision.is_none() {
            return Err(format!("'{field}' present without a decision"));
        }
        if result.ok && result.artifacts.is_empty() {
            return Err(format!("'{field}' is successful but lists no artifacts"));
        }
    }

    Ok(())
}

/// Canonical document text of a project
///
/// # Errors
///
/// `ProjectError::Write` if serialization fails.
pub fn to_document_string(project: &Project) -> Result<String, ProjectError> {
    let doc = DocumentOut {
        project: &project.name,
        script: project
            .script
            .iter()
            .map(|line| LineOut {
                status: line.status_label(),
                line,
            })
            .collect(),
        created_at: project.created_at.as_deref(),
        updated_at: project.updated_at.as_deref(),
        extra: &project.extra,
    };
    to_canonical_pretty(&doc).map_err(|e| ProjectError::Write {
        path: project.name.clone(),
        reason: format!("{e:#}"),
    })
}

/// Load and validate a project document from disk
///
/// # Errors
///
/// `ProjectError::NotFound`, `ProjectError::Read` or `ProjectError::Corrupt`.
pub fn load(path: &Utf8Path) -> Result<Project, ProjectError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ProjectError::NotFound {
                path: path.to_string(),
            }
        } else {
            ProjectError::Read {
                path: path.to_string(),
                source,
            }
        }
    })?;
    parse(&content, path.as_str())
}

/// Atomically write the project's canonical document to `path`
///
/// # Errors
///
/// `ProjectError::Write` if serialization or the atomic write fails.
pub fn save(project: &Project, path: &Utf8Path) -> Result<(), ProjectError> {
    let content = to_document_string(project)?;
    write_file_atomic(path, &content).map_err(|e| ProjectError::Write {
        path: path.to_string(),
        reason: format!("{e:#}"),
    })?;
    tracing::debug!(project = %project.name, path = %path, bytes = content.len(), "Saved project");
    Ok(())
}
