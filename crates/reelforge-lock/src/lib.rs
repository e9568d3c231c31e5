//! Advisory lock files for project documents
//!
//! A run holds an exclusive lock on its project document for its whole
//! duration so that two `reelforge run` invocations never interleave writes to
//! the same file. The lock is a sibling file (`<document>.lock`) created with
//! `create_new` semantics and holding a small JSON record describing the
//! owner. The locking is advisory and is not a security boundary.

use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, warn};

/// Default age after which a lock is considered stale (in seconds)
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 6 * 3600;

/// Owner record written into the lock file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockInfo {
    /// Process ID that created the lock
    pub pid: u32,
    /// When the lock was created
    pub created_at: DateTime<Utc>,
    /// Project document being locked
    pub document: String,
    /// reelforge version that created the lock
    pub version: String,
}

/// Lock errors for project locking operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Project '{document}' is locked by PID {pid} (created {created_ago} ago)")]
    ConcurrentExecution {
        document: String,
        pid: u32,
        created_ago: String,
    },

    #[error("Stale lock detected for '{document}' (PID {pid}, age {age_secs}s). Use --force-lock to override")]
    StaleLock {
        document: String,
        pid: u32,
        age_secs: u64,
    },

    #[error("Lock file is corrupted or invalid: {reason}")]
    CorruptedLock { reason: String },

    #[error("Failed to acquire lock: {reason}")]
    AcquisitionFailed { reason: String },

    #[error("IO error during lock operation: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive lock on a project document, released on drop
pub struct ProjectLock {
    lock_path: PathBuf,
    _fd_lock: Option<Box<RwLock<fs::File>>>,
    info: LockInfo,
}

impl ProjectLock {
    /// Path of the lock file guarding `document`
    #[must_use]
    pub fn lock_path_for(document: &Path) -> PathBuf {
        let mut name = document
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "project".into());
        name.push(".lock");
        document.with_file_name(name)
    }

    /// Acquire the lock for `document`.
    ///
    /// An existing lock older than `ttl_seconds` (default
    /// [`DEFAULT_STALE_THRESHOLD_SECS`]) is stale; it is only broken when
    /// `force` is set. A corrupted lock file is likewise only removed with
    /// `force`.
    pub fn acquire(
        document: &Path,
        force: bool,
        ttl_seconds: Option<u64>,
    ) -> Result<Self, LockError> {
        let lock_path = Self::lock_path_for(document);
        let ttl = ttl_seconds.unwrap_or(DEFAULT_STALE_THRESHOLD_SECS);
        let info = LockInfo {
            pid: process::id(),
            created_at: Utc::now(),
            document: document.display().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        // Second attempt only happens after a forced removal
        for _ in 0..2 {
            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&lock_path)
            {
                Ok(file) => return Self::finalize(lock_path, file, info),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Self::check_existing(&lock_path, &info.document, force, ttl)?;
                    warn!(lock = %lock_path.display(), "Breaking existing project lock");
                    match fs::remove_file(&lock_path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(LockError::Io(e)),
                    }
                }
                Err(e) => {
                    return Err(LockError::AcquisitionFailed {
                        reason: format!(
                            "Failed to create lock file at '{}': {e}",
                            lock_path.display()
                        ),
                    });
                }
            }
        }

        Err(LockError::AcquisitionFailed {
            reason: format!(
                "Another process re-created '{}' while the stale lock was being removed",
                lock_path.display()
            ),
        })
    }

    /// Decide whether an existing lock may be broken. `Ok(())` means yes.
    fn check_existing(
        lock_path: &Path,
        document: &str,
        force: bool,
        ttl_seconds: u64,
    ) -> Result<(), LockError> {
        let raw = fs::read_to_string(lock_path)?;
        let existing: LockInfo = match serde_json::from_str(&raw) {
            Ok(info) => info,
            Err(e) if force => {
                debug!(error = %e, "Ignoring corrupted lock file because force was requested");
                return Ok(());
            }
            Err(e) => {
                return Err(LockError::CorruptedLock {
                    reason: format!("{}: {e}", lock_path.display()),
                });
            }
        };

        let age = Utc::now()
            .signed_duration_since(existing.created_at)
            .num_seconds()
            .max(0) as u64;

        if age >= ttl_seconds {
            if force {
                return Ok(());
            }
            return Err(LockError::StaleLock {
                document: document.to_string(),
                pid: existing.pid,
                age_secs: age,
            });
        }

        Err(LockError::ConcurrentExecution {
            document: document.to_string(),
            pid: existing.pid,
            created_ago: format_age(age),
        })
    }

    fn finalize(lock_path: PathBuf, file: fs::File, info: LockInfo) -> Result<Self, LockError> {
        let json = serde_json::to_string_pretty(&info).map_err(|e| LockError::AcquisitionFailed {
            reason: format!("Failed to serialize lock info: {e}"),
        })?;

        let mut rw_lock = Box::new(RwLock::new(file));
        {
            let guard = rw_lock
                .try_write()
                .map_err(|_| LockError::ConcurrentExecution {
                    document: info.document.clone(),
                    pid: 0,
                    created_ago: "unknown".to_string(),
                })?;
            let mut file_ref = &*guard;
            file_ref.write_all(json.as_bytes())?;
            file_ref.flush()?;
            file_ref.sync_all()?;
        }

        debug!(lock = %lock_path.display(), pid = info.pid, "Acquired project lock");
        Ok(Self {
            lock_path,
            _fd_lock: Some(rw_lock),
            info,
        })
    }

    /// Owner record of this lock
    #[must_use]
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Location of the lock file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl std::fmt::Debug for ProjectLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectLock")
            .field("lock_path", &self.lock_path)
            .field("info", &self.info)
            .field("_fd_lock", &"<RwLock>")
            .finish()
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        self._fd_lock.take();
        if let Err(e) = fs::remove_file(&self.lock_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(lock = %self.lock_path.display(), error = %e, "Failed to remove lock file");
            }
        }
    }
}

fn format_age(secs: u64) -> String {
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m", secs / 60),
        _ => format!("{}h{}m", secs / 3600, (secs % 3600) / 60),
    }
}
