//! Dedicated reader loop for the leader's end of the message channel.
//!
//! One OS thread owns the read descriptor and blocks on `receive()` in a
//! loop, forwarding control events to the main task over a tokio channel.
//! Compared to a one-shot arrival notification that must re-arm itself on
//! every delivery, a perpetually-blocking reader has no re-arm window in
//! which a message could go unannounced, and no two handlers ever race
//! over the descriptor.
//!
//! The startup drain runs on the main thread strictly before `spawn`, so
//! the two access windows to the descriptor never overlap.

use crate::channel::MessageChannel;
use crate::error::SolodError;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Reserved payload value interpreted as "terminate the leader", never as
/// data.
pub const EXIT_SENTINEL: &[u8] = b"exit";

/// Events the listener reports to the main task.
#[derive(Debug)]
pub enum ControlEvent {
    /// An ordinary payload arrived.
    Message(Vec<u8>),
    /// The exit sentinel arrived; the leader should terminate cleanly.
    Shutdown,
    /// The channel broke mid-delivery. It cannot be trusted to carry
    /// further control messages, so the leader must terminate.
    Fatal(SolodError),
}

/// Handle to the reader thread.
///
/// The thread runs detached from the leader's point of view: it ends on
/// the sentinel or a receive failure, and dies with the process otherwise.
#[derive(Debug)]
pub struct MessageListener {
    handle: JoinHandle<()>,
}

impl MessageListener {
    /// Move the read channel onto a dedicated thread and start the
    /// receive loop.
    pub fn spawn(channel: MessageChannel, events: mpsc::UnboundedSender<ControlEvent>) -> Self {
        let handle = std::thread::spawn(move || receive_loop(channel, events));
        Self { handle }
    }

    /// Whether the receive loop has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the receive loop to end. Only returns after the sentinel
    /// or a receive failure; used by tests.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}

fn receive_loop(channel: MessageChannel, events: mpsc::UnboundedSender<ControlEvent>) {
    loop {
        match channel.receive() {
            Ok(payload) if payload == EXIT_SENTINEL => {
                info!("Received exit sentinel on {}", channel.name());
                let _ = events.send(ControlEvent::Shutdown);
                break;
            }
            Ok(payload) => {
                info!(
                    "Received {} bytes on {}: {}",
                    payload.len(),
                    channel.name(),
                    String::from_utf8_lossy(&payload)
                );
                if events.send(ControlEvent::Message(payload)).is_err() {
                    // Main task is gone; nothing left to deliver to.
                    break;
                }
            }
            Err(e) => {
                error!("Receive failed on {}: {}", channel.name(), e);
                let _ = events.send(ControlEvent::Fatal(e));
                break;
            }
        }
    }
}
