//! Centralized configuration for solod.
//!
//! Fixed paths, queue attributes and loop cadences live here so the rest
//! of the code never hardcodes them.

use std::time::Duration;

/// Lock-file election configuration.
pub struct LockConfig;

impl LockConfig {
    /// Well-known lock file shared by every invocation on the host.
    pub const LOCK_FILE: &'static str = "/tmp/solod.lock";
}

/// Message queue configuration.
pub struct ChannelConfig;

impl ChannelConfig {
    /// Well-known queue name; POSIX requires the leading slash.
    pub const QUEUE_NAME: &'static str = "/solod";
    /// Queue depth set when the leader creates the queue.
    pub const MAX_MESSAGES: i64 = 10;
    /// Per-message size ceiling in bytes. Oversized payloads are rejected
    /// at send time, never truncated.
    pub const MAX_MESSAGE_SIZE: i64 = 1024;
}

/// Leader idle-loop configuration.
pub struct IdleConfig;

impl IdleConfig {
    /// Cadence of the watcher poll / heartbeat tick.
    pub const IDLE_INTERVAL: Duration = Duration::from_secs(2);
}
