//! solod core - single-instance coordination primitives.
//!
//! Guarantees that only one instance of a process runs at a time on a
//! host, and lets later invocations relay a short payload to the running
//! instance instead of starting a duplicate.
//!
//! The pieces, leaves first:
//!
//! - [`lock`]: leader election via one non-blocking exclusive record lock
//!   on a well-known file.
//! - [`channel`]: a named, kernel-persistent, bounded message queue;
//!   write-only for followers, read-create for the leader.
//! - [`listener`]: a dedicated reader thread that blocks on the channel
//!   and forwards control events (payload, exit sentinel, fatal) to the
//!   leader's main task.
//! - [`watch`]: peripheral directory-change diagnostics polled by the
//!   leader's idle loop.
//!
//! # Example
//!
//! ```rust,ignore
//! use solod_core::{config::{ChannelConfig, LockConfig}, InstanceLock, MessageChannel};
//!
//! let lock = InstanceLock::acquire(LockConfig::LOCK_FILE)?;
//! if lock.is_leader() {
//!     let channel = MessageChannel::open_reader(ChannelConfig::QUEUE_NAME)?;
//!     let stale = channel.drain()?;
//!     // spawn a MessageListener, run the idle loop...
//! } else {
//!     let channel = MessageChannel::open_writer(ChannelConfig::QUEUE_NAME)?;
//!     channel.send(b"hello")?;
//! }
//! # Ok::<(), solod_core::SolodError>(())
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod listener;
pub mod lock;
pub mod watch;

// Re-export commonly used types
pub use channel::{ChannelAttributes, MessageChannel};
pub use error::{Result, SolodError};
pub use listener::{ControlEvent, MessageListener, EXIT_SENTINEL};
pub use lock::{InstanceLock, Role};
pub use watch::{ChangeEvent, DirectoryWatcher};
