//! Error types for solod.
//!
//! Distinguishes fatal setup failures from the classified, expected
//! conditions (another instance running, queue never created) that map to
//! specific exit codes rather than crashes.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for single-instance coordination.
#[derive(Debug, Error)]
pub enum SolodError {
    // Fatal startup errors: lock file, queue creation, watcher init
    #[error("Setup failed ({context}): {source}")]
    Setup {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Expected conditions on the follower path
    #[error("Channel unavailable: another instance is running{}", fmt_holder(.holder_pid))]
    ChannelUnavailable { holder_pid: Option<i32> },

    #[error("No such channel: {name} (no leader has created it)")]
    NoSuchChannel { name: String },

    #[error("Payload is {actual} bytes but the channel accepts at most {max}")]
    PayloadTooLarge { actual: usize, max: usize },

    // Fatal within the delivery path: a broken queue cannot be trusted
    // to carry further control messages
    #[error("Receive failed on {name}: {source}")]
    Receive {
        name: String,
        #[source]
        source: std::io::Error,
    },

    // Peripheral watcher errors
    #[error("Watch error at {path:?}: {message}")]
    Watch { message: String, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for solod operations.
pub type Result<T> = std::result::Result<T, SolodError>;

fn fmt_holder(pid: &Option<i32>) -> String {
    match pid {
        Some(pid) => format!(" (PID {})", pid),
        None => String::new(),
    }
}

impl SolodError {
    /// Create a fatal setup error with context.
    pub fn setup(context: impl Into<String>, source: std::io::Error) -> Self {
        SolodError::Setup {
            context: context.into(),
            source,
        }
    }

    /// Create a setup error from a nix errno.
    pub fn setup_errno(context: impl Into<String>, errno: nix::errno::Errno) -> Self {
        Self::setup(context, std::io::Error::from(errno))
    }

    /// Whether this error means "another instance already runs" and the
    /// caller should exit with code 1 instead of aborting.
    pub fn is_instance_conflict(&self) -> bool {
        matches!(self, SolodError::ChannelUnavailable { .. })
    }
}
