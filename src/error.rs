//! Typed failure kinds.
//!
//! Helpers return `anyhow::Result` and attach context freely; the variants
//! below travel inside the `anyhow::Error` so that callers can branch on the
//! kind with `downcast_ref::<PdkError>()` instead of matching on messages.

use std::path::PathBuf;
use std::process::ExitStatus;

#[derive(Debug, thiserror::Error)]
pub enum PdkError {
    /// The version exists neither locally nor as a remote release.
    #[error("Version {version} of {family} not found remotely.")]
    NotFound { family: String, version: String },

    #[error("Unsupported PDK family '{0}'.")]
    UnknownFamily(String),

    #[error("Unknown library {library} for PDK {family}")]
    UnknownLibrary { family: String, library: String },

    #[error("Version {0} is not installed.")]
    NotInstalled(String),

    #[error("Version {version} is not the current version of {family}.")]
    NotCurrent { family: String, version: String },

    /// A variant path is occupied by something that is not a symlink.
    #[error("{0} exists, and not as a symlink. Remove it then try re-enabling.")]
    FileConflict(PathBuf),

    #[error("Release {release} has no asset for {asset}.")]
    MissingAsset { release: String, asset: String },

    #[error("{0}")]
    Transport(String),

    #[error("{program} failed ({status}):\n{stderr}")]
    Command {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Interrupted.")]
    Interrupted,
}

impl PdkError {
    /// Returns the typed kind carried by an `anyhow::Error`, if any.
    pub fn kind_of(error: &anyhow::Error) -> Option<&PdkError> {
        error.chain().find_map(|e| e.downcast_ref::<PdkError>())
    }

    pub fn is_not_found(error: &anyhow::Error) -> bool {
        matches!(Self::kind_of(error), Some(PdkError::NotFound { .. }))
    }

    pub fn is_interrupted(error: &anyhow::Error) -> bool {
        matches!(Self::kind_of(error), Some(PdkError::Interrupted))
    }
}
