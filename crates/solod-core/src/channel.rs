//! Named message channel between followers and the leader.
//!
//! Wraps a POSIX message queue: a named, kernel-persistent, bounded queue
//! that exists independently of any one process. The leader opens it
//! read-create with fixed attributes; followers open it write-only and
//! non-blocking, so a full queue surfaces immediately as "another instance
//! is running" instead of blocking the sender.
//!
//! The reader descriptor is intentionally blocking: the listener thread
//! (see [`crate::listener`]) exists to block on it, and the startup drain
//! bounds itself with the queue's current depth instead of `O_NONBLOCK`.

use crate::config::ChannelConfig;
use crate::error::{Result, SolodError};
use nix::mqueue::{mq_close, mq_getattr, mq_open, mq_receive, mq_send, mq_unlink, MQ_OFlag, MqAttr, MqdT};
use nix::sys::stat::Mode;
use std::ffi::CString;
use tracing::{debug, trace};

/// Queue attributes as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAttributes {
    /// Per-message size ceiling in bytes.
    pub max_message_size: usize,
    /// Maximum number of queued messages.
    pub max_depth: usize,
    /// Messages currently sitting in the queue.
    pub queued: usize,
}

/// One end of the named message queue.
///
/// Whether it is the sending or receiving end is fixed by the opener
/// (`open_writer` / `open_reader`); the kernel enforces the access mode.
pub struct MessageChannel {
    mqd: Option<MqdT>,
    name: String,
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel").field("name", &self.name).finish()
    }
}

impl MessageChannel {
    /// Open the queue for sending (follower path).
    ///
    /// Non-blocking: a saturated queue fails the send instead of waiting.
    /// Fails with `NoSuchChannel` if no leader has ever created the queue.
    pub fn open_writer(name: &str) -> Result<Self> {
        let cname = queue_cname(name)?;
        let oflag = MQ_OFlag::O_WRONLY | MQ_OFlag::O_NONBLOCK;

        match mq_open(cname.as_c_str(), oflag, Mode::empty(), None) {
            Ok(mqd) => {
                debug!("Opened queue {} for writing", name);
                Ok(Self {
                    mqd: Some(mqd),
                    name: name.to_string(),
                })
            }
            Err(nix::errno::Errno::ENOENT) => Err(SolodError::NoSuchChannel {
                name: name.to_string(),
            }),
            Err(errno) => Err(SolodError::setup_errno(format!("open queue {}", name), errno)),
        }
    }

    /// Open the queue for receiving (leader path), creating it with the
    /// configured depth and message-size attributes if absent.
    pub fn open_reader(name: &str) -> Result<Self> {
        let cname = queue_cname(name)?;
        let oflag = MQ_OFlag::O_RDONLY | MQ_OFlag::O_CREAT;
        let mode = Mode::S_IRUSR | Mode::S_IWUSR;
        let attr = MqAttr::new(
            0,
            ChannelConfig::MAX_MESSAGES,
            ChannelConfig::MAX_MESSAGE_SIZE,
            0,
        );

        let mqd = mq_open(cname.as_c_str(), oflag, mode, Some(&attr))
            .map_err(|errno| SolodError::setup_errno(format!("create queue {}", name), errno))?;

        debug!("Opened queue {} for reading", name);
        Ok(Self {
            mqd: Some(mqd),
            name: name.to_string(),
        })
    }

    /// Queue name (with the leading slash).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Query the queue's attributes from the kernel.
    pub fn attributes(&self) -> Result<ChannelAttributes> {
        let attr = mq_getattr(self.mqd()).map_err(|errno| SolodError::Receive {
            name: self.name.clone(),
            source: std::io::Error::from(errno),
        })?;

        Ok(ChannelAttributes {
            max_message_size: attr.msgsize() as usize,
            max_depth: attr.maxmsg() as usize,
            queued: attr.curmsgs() as usize,
        })
    }

    /// Send one payload with a single non-blocking attempt.
    ///
    /// Payloads above the queue's message-size ceiling are rejected up
    /// front, never truncated. A full queue maps to `ChannelUnavailable`,
    /// which callers report as "another instance is running"; there is no
    /// retry.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        let max = self.attributes()?.max_message_size;
        if payload.len() > max {
            return Err(SolodError::PayloadTooLarge {
                actual: payload.len(),
                max,
            });
        }

        match mq_send(self.mqd(), payload, 0) {
            Ok(()) => {
                trace!("Sent {} bytes on {}", payload.len(), self.name);
                Ok(())
            }
            Err(nix::errno::Errno::EAGAIN) => {
                Err(SolodError::ChannelUnavailable { holder_pid: None })
            }
            Err(errno) => Err(SolodError::setup_errno(
                format!("send on queue {}", self.name),
                errno,
            )),
        }
    }

    /// Receive exactly one message, blocking until one arrives.
    ///
    /// The buffer is sized from the queue's message-size attribute, as
    /// `mq_receive` requires.
    pub fn receive(&self) -> Result<Vec<u8>> {
        let max = self.attributes()?.max_message_size;
        let mut buf = vec![0u8; max];
        let mut priority = 0u32;

        let received = mq_receive(self.mqd(), &mut buf, &mut priority).map_err(|errno| {
            SolodError::Receive {
                name: self.name.clone(),
                source: std::io::Error::from(errno),
            }
        })?;

        buf.truncate(received);
        trace!("Received {} bytes on {}", received, self.name);
        Ok(buf)
    }

    /// Discard every message currently queued and return how many there
    /// were.
    ///
    /// Used once at leader startup: messages left by a previous, now-dead
    /// leader predate the listener and would otherwise be misdelivered to
    /// the new instance. Bounded by the current depth, so it never blocks
    /// even though the descriptor itself is blocking.
    pub fn drain(&self) -> Result<usize> {
        let mut discarded = 0;
        while self.attributes()?.queued > 0 {
            let stale = self.receive()?;
            debug!(
                "Discarded stale message ({} bytes) on {}",
                stale.len(),
                self.name
            );
            discarded += 1;
        }
        Ok(discarded)
    }

    /// Remove the queue name from the kernel namespace.
    ///
    /// Idempotent: unlinking a name that is already gone is not an error.
    /// Open descriptors stay usable until closed; only the name vanishes.
    pub fn unlink(name: &str) -> Result<()> {
        let cname = queue_cname(name)?;
        match mq_unlink(cname.as_c_str()) {
            Ok(()) | Err(nix::errno::Errno::ENOENT) => Ok(()),
            Err(errno) => Err(SolodError::setup_errno(format!("unlink queue {}", name), errno)),
        }
    }

    fn mqd(&self) -> &MqdT {
        // Only Drop takes the descriptor out, after which self is gone.
        self.mqd.as_ref().expect("message queue descriptor closed")
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        if let Some(mqd) = self.mqd.take() {
            let _ = mq_close(mqd);
        }
    }
}

/// Validate the queue name and convert it for the mq_* calls.
fn queue_cname(name: &str) -> Result<CString> {
    if !name.starts_with('/') || name.len() < 2 {
        return Err(SolodError::setup(
            format!("queue name {:?}", name),
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "queue names must be \"/name\"",
            ),
        ));
    }
    CString::new(name).map_err(|_| {
        SolodError::setup(
            format!("queue name {:?}", name),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "embedded NUL in queue name"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Unlinks the queue when the test ends, pass or fail.
    struct QueueGuard(String);

    impl Drop for QueueGuard {
        fn drop(&mut self) {
            let _ = MessageChannel::unlink(&self.0);
        }
    }

    fn unique_queue(tag: &str) -> (String, QueueGuard) {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let name = format!(
            "/solod-test-{}-{}-{}",
            std::process::id(),
            tag,
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        (name.clone(), QueueGuard(name))
    }

    #[test]
    fn test_open_writer_without_queue_fails() {
        let (name, _guard) = unique_queue("nowriter");
        match MessageChannel::open_writer(&name) {
            Err(SolodError::NoSuchChannel { name: n }) => assert_eq!(n, name),
            other => panic!("Expected NoSuchChannel, got: {:?}", other),
        }
    }

    #[test]
    fn test_reader_creates_queue_with_configured_attributes() {
        let (name, _guard) = unique_queue("attrs");
        let reader = MessageChannel::open_reader(&name).unwrap();

        let attrs = reader.attributes().unwrap();
        assert_eq!(attrs.max_depth, ChannelConfig::MAX_MESSAGES as usize);
        assert_eq!(
            attrs.max_message_size,
            ChannelConfig::MAX_MESSAGE_SIZE as usize
        );
        assert_eq!(attrs.queued, 0);
    }

    #[test]
    fn test_send_receive_roundtrip() {
        let (name, _guard) = unique_queue("roundtrip");
        let reader = MessageChannel::open_reader(&name).unwrap();
        let writer = MessageChannel::open_writer(&name).unwrap();

        writer.send(b"hello").unwrap();
        assert_eq!(reader.receive().unwrap(), b"hello");
    }

    #[test]
    fn test_messages_preserve_send_order() {
        let (name, _guard) = unique_queue("order");
        let reader = MessageChannel::open_reader(&name).unwrap();
        let writer = MessageChannel::open_writer(&name).unwrap();

        for payload in [&b"first"[..], &b"second"[..], &b"third"[..]] {
            writer.send(payload).unwrap();
        }
        assert_eq!(reader.receive().unwrap(), b"first");
        assert_eq!(reader.receive().unwrap(), b"second");
        assert_eq!(reader.receive().unwrap(), b"third");
    }

    #[test]
    fn test_oversized_payload_rejected_not_truncated() {
        let (name, _guard) = unique_queue("oversize");
        let reader = MessageChannel::open_reader(&name).unwrap();
        let writer = MessageChannel::open_writer(&name).unwrap();

        let payload = vec![b'x'; ChannelConfig::MAX_MESSAGE_SIZE as usize + 1];
        match writer.send(&payload) {
            Err(SolodError::PayloadTooLarge { actual, max }) => {
                assert_eq!(actual, payload.len());
                assert_eq!(max, ChannelConfig::MAX_MESSAGE_SIZE as usize);
            }
            other => panic!("Expected PayloadTooLarge, got: {:?}", other),
        }
        // Nothing reached the queue.
        assert_eq!(reader.attributes().unwrap().queued, 0);
    }

    #[test]
    fn test_full_queue_reports_channel_unavailable() {
        let (name, _guard) = unique_queue("full");
        let _reader = MessageChannel::open_reader(&name).unwrap();
        let writer = MessageChannel::open_writer(&name).unwrap();

        for _ in 0..ChannelConfig::MAX_MESSAGES {
            writer.send(b"fill").unwrap();
        }
        match writer.send(b"overflow") {
            Err(SolodError::ChannelUnavailable { .. }) => {}
            other => panic!("Expected ChannelUnavailable, got: {:?}", other),
        }
    }

    #[test]
    fn test_drain_discards_all_and_counts() {
        let (name, _guard) = unique_queue("drain");
        let reader = MessageChannel::open_reader(&name).unwrap();
        let writer = MessageChannel::open_writer(&name).unwrap();

        writer.send(b"stale-1").unwrap();
        writer.send(b"stale-2").unwrap();
        writer.send(b"exit").unwrap(); // even the sentinel is discarded

        assert_eq!(reader.drain().unwrap(), 3);
        assert_eq!(reader.attributes().unwrap().queued, 0);
    }

    #[test]
    fn test_drain_on_empty_queue_is_noop() {
        let (name, _guard) = unique_queue("drainempty");
        let reader = MessageChannel::open_reader(&name).unwrap();
        assert_eq!(reader.drain().unwrap(), 0);
    }

    #[test]
    fn test_unlink_is_idempotent() {
        let (name, _guard) = unique_queue("unlink");
        let _reader = MessageChannel::open_reader(&name).unwrap();

        MessageChannel::unlink(&name).unwrap();
        // Second unlink: name already gone, still Ok.
        MessageChannel::unlink(&name).unwrap();
        // New writers observe the missing name.
        assert!(matches!(
            MessageChannel::open_writer(&name),
            Err(SolodError::NoSuchChannel { .. })
        ));
    }

    #[test]
    fn test_invalid_queue_name_rejected() {
        assert!(MessageChannel::open_reader("no-slash").is_err());
        assert!(MessageChannel::open_reader("/").is_err());
    }
}
