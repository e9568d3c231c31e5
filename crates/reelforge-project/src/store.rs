use camino::{Utf8Path, Utf8PathBuf};
use reelforge_lock::ProjectLock;
use reelforge_utils::error::ReelforgeError;
use tracing::info;

use crate::document;
use crate::model::Project;

/// Locked handle on a project document.
///
/// Holding a `ProjectStore` means holding the document's lock file; the
/// lock is released when the store is dropped. All saves of a run go
/// through one store.
#[derive(Debug)]
pub struct ProjectStore {
    path: Utf8PathBuf,
    lock: ProjectLock,
}

impl ProjectStore {
    /// Lock the document at `path`.
    ///
    /// `force_lock` breaks a stale or corrupted lock left behind by a dead
    /// process. A lock held by a live run is never broken.
    ///
    /// # Errors
    ///
    /// `ReelforgeError::Lock` when the lock cannot be acquired.
    pub fn open(path: &Utf8Path, force_lock: bool) -> Result<Self, ReelforgeError> {
        let lock = ProjectLock::acquire(path.as_std_path(), force_lock, None)?;
        info!(path = %path, pid = lock.info().pid, "Acquired project lock");
        Ok(Self {
            path: path.to_path_buf(),
            lock,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    #[must_use]
    pub fn lock(&self) -> &ProjectLock {
        &self.lock
    }

    /// Load and validate the document
    pub fn load(&self) -> Result<Project, ReelforgeError> {
        Ok(document::load(&self.path)?)
    }

    /// Atomically persist the project
    pub fn save(&self, project: &Project) -> Result<(), ReelforgeError> {
        Ok(document::save(project, &self.path)?)
    }
}
