//! Exit code constants and error mapping for reelforge.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Run finished and no line ended failed |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `LINES_FAILED` | Run finished but at least one line failed |
//! | 4 | `CORRUPT_PROJECT` | Project document unreadable or invalid |
//! | 5 | `REGISTRY` | Method registry misconfiguration |
//! | 6 | `PREFLIGHT_FAILED` | `check` found a blocking problem |
//! | 9 | `LOCK_HELD` | Another process holds the project lock |
//! | 130 | `INTERRUPTED` | Run stopped by a cancellation request |

use crate::error::{ProjectError, ReelforgeError};

/// Exit codes matching the documented exit code table.
///
/// The numeric values are part of the CLI contract.
///
/// ```rust
/// use reelforge_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::LINES_FAILED.as_i32(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - no line ended failed
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments or configuration error
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// At least one line ended in the failed state
    pub const LINES_FAILED: ExitCode = ExitCode(3);

    /// Project document is corrupt or unreadable
    pub const CORRUPT_PROJECT: ExitCode = ExitCode(4);

    /// Method registry misconfiguration (duplicate or unknown configured name)
    pub const REGISTRY: ExitCode = ExitCode(5);

    /// Preflight check found a problem that would stop a run
    pub const PREFLIGHT_FAILED: ExitCode = ExitCode(6);

    /// Another process holds the project lock
    pub const LOCK_HELD: ExitCode = ExitCode(9);

    /// Run was interrupted before all stages were attempted
    pub const INTERRUPTED: ExitCode = ExitCode(130);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl ReelforgeError {
    /// Map this error to the CLI exit code
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Registry(_) => ExitCode::REGISTRY,
            Self::Project(ProjectError::UnknownLine { .. }) => ExitCode::CLI_ARGS,
            Self::Project(_) => ExitCode::CORRUPT_PROJECT,
            Self::Lock(_) => ExitCode::LOCK_HELD,
            Self::Llm(_) | Self::Io(_) => ExitCode::INTERNAL,
        }
    }
}
