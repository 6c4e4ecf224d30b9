//! Follower send path.
//!
//! A follower never waits: one non-blocking send, then exit. A saturated
//! or reader-less queue means the leader is busy or present, reported as
//! "another instance is running" with exit code 1 rather than a crash.

use anyhow::Result;
use solod_core::{MessageChannel, SolodError};
use std::process::ExitCode;
use tracing::{info, warn};

/// Forward `payload` to the leader and exit.
///
/// `holder_pid` is the lock holder recovered during election, attached to
/// the conflict report when available.
pub fn run(queue_name: &str, payload: &str, holder_pid: Option<i32>) -> Result<ExitCode> {
    let channel = MessageChannel::open_writer(queue_name)?;

    match channel.send(payload.as_bytes()) {
        Ok(()) => {
            info!(
                "Forwarded {:?} ({} bytes) to the running instance",
                payload,
                payload.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(SolodError::ChannelUnavailable { .. }) => {
            // Re-raise with the PID learned at election time.
            warn!("{}", SolodError::ChannelUnavailable { holder_pid });
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e.into()),
    }
}
