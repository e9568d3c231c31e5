//! Exclusive claims on per-line working directories.
//!
//! A method writes its artifacts into the working directory of one
//! `project` + `target_name` pair. The claim is held for the duration of the
//! call; a second claim on the same pair fails until the first guard drops.

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::MethodError;

/// Registry of currently held workdir claims
#[derive(Debug, Clone, Default)]
pub struct WorkdirClaims {
    held: Arc<Mutex<HashSet<(String, String)>>>,
}

impl WorkdirClaims {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path` for `project` + `target`, creating the directory.
    ///
    /// # Errors
    ///
    /// `MethodError::WorkdirBusy` when the pair is already claimed,
    /// `MethodError::Io` when the directory cannot be created.
    pub fn claim(
        &self,
        project: &str,
        target: &str,
        path: &Utf8Path,
    ) -> Result<WorkdirGuard, MethodError> {
        let key = (project.to_string(), target.to_string());
        {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            if !held.insert(key.clone()) {
                warn!(project, target_name = target, "Working directory already claimed");
                return Err(MethodError::WorkdirBusy {
                    project: key.0,
                    target: key.1,
                });
            }
        }

        let guard = WorkdirGuard {
            claims: Arc::clone(&self.held),
            key,
            path: path.to_path_buf(),
        };
        std::fs::create_dir_all(path)?;
        debug!(project, target_name = target, %path, "Claimed working directory");
        Ok(guard)
    }

    /// Whether the pair is currently claimed
    #[must_use]
    pub fn is_claimed(&self, project: &str, target: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(project.to_string(), target.to_string()))
    }
}

/// Held claim on a working directory; released on drop
#[derive(Debug)]
pub struct WorkdirGuard {
    claims: Arc<Mutex<HashSet<(String, String)>>>,
    key: (String, String),
    path: Utf8PathBuf,
}

impl WorkdirGuard {
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        debug!(project = %self.key.0, target_name = %self.key.1, "Released working directory");
    }
}
