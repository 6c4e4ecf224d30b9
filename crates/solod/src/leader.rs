//! Leader bootstrap and idle loop.
//!
//! Startup order matters: open the queue, discard whatever a previous,
//! now-dead leader left behind, and only then hand the descriptor to the
//! listener thread. Messages queued before the drain are stale by
//! definition; messages arriving after it are picked up by the listener's
//! first blocking receive, so nothing is lost in between.

use anyhow::{anyhow, Result};
use solod_core::config::IdleConfig;
use solod_core::{ControlEvent, DirectoryWatcher, MessageChannel, MessageListener};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Run the leader until the exit sentinel arrives or the channel breaks.
pub async fn run(queue_name: &str, watch_dir: &Path) -> Result<()> {
    let channel = MessageChannel::open_reader(queue_name)?;

    let stale = channel.drain()?;
    if stale > 0 {
        info!("Discarded {} stale message(s) from a previous leader", stale);
    }

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let _listener = MessageListener::spawn(channel, event_tx);

    let watcher = DirectoryWatcher::new(watch_dir)?;
    info!(
        "Listening on {}, watching {}",
        queue_name,
        watch_dir.display()
    );

    let mut ticker = tokio::time::interval(IdleConfig::IDLE_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for change in watcher.poll_events() {
                    info!("Change: {}", change);
                }
                debug!("Idle, still the only instance");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                unlink_queue(queue_name);
                return Ok(());
            }
            event = events.recv() => match event {
                Some(ControlEvent::Message(payload)) => {
                    // Already logged by the listener; keep the loop going.
                    debug!("Relayed payload of {} bytes", payload.len());
                }
                Some(ControlEvent::Shutdown) => {
                    info!("Exit sentinel received, shutting down");
                    unlink_queue(queue_name);
                    return Ok(());
                }
                Some(ControlEvent::Fatal(e)) => {
                    return Err(anyhow!(e).context("message channel broke"));
                }
                None => {
                    return Err(anyhow!("listener ended without a shutdown event"));
                }
            }
        }
    }
}

/// Remove the queue name on clean shutdown so names do not pile up in the
/// kernel namespace across runs. After a crash the name persists and the
/// next leader's startup drain takes care of leftovers.
fn unlink_queue(queue_name: &str) {
    if let Err(e) = MessageChannel::unlink(queue_name) {
        warn!("Failed to unlink {}: {}", queue_name, e);
    }
}
