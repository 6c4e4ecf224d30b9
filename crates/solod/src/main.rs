//! solod - single-instance process guard.
//!
//! The first invocation on a host takes the instance lock and keeps
//! running as the leader. Every later invocation becomes a follower: it
//! forwards its last argument over the message queue to the leader and
//! exits. The reserved payload `exit` tells the leader to terminate.

mod follower;
mod leader;

use anyhow::Result;
use clap::Parser;
use solod_core::config::{ChannelConfig, LockConfig};
use solod_core::{InstanceLock, Role};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "solod")]
#[command(about = "Run a single instance per host; relay payloads to it from later invocations")]
struct Args {
    /// Lock file deciding which process is the leader
    #[arg(long, default_value = LockConfig::LOCK_FILE)]
    lock_file: PathBuf,

    /// Message queue name (must start with '/')
    #[arg(long, default_value = ChannelConfig::QUEUE_NAME)]
    queue_name: String,

    /// Directory to watch for change diagnostics (defaults to the lock
    /// file's directory)
    #[arg(long)]
    watch_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Arbitrary arguments; only the final one is forwarded as the payload
    #[arg(value_name = "ARGS")]
    payload: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    // One synchronous, non-blocking election at startup; the lock handle
    // must outlive the leader loop, since dropping it would let a second
    // leader in.
    let lock = InstanceLock::acquire(&args.lock_file)?;

    match lock.role() {
        Role::Leader => {
            info!("Leader instance (PID {})", std::process::id());
            let watch_dir = args
                .watch_dir
                .clone()
                .unwrap_or_else(|| default_watch_dir(&args.lock_file));
            leader::run(&args.queue_name, &watch_dir).await?;
            Ok(ExitCode::SUCCESS)
        }
        Role::Follower { holder_pid } => {
            let payload = resolve_payload(&args.payload);
            follower::run(&args.queue_name, &payload, *holder_pid)
        }
    }
}

/// Only the final argument is the payload; with none at all, fall back to
/// the program name.
fn resolve_payload(tail: &[String]) -> String {
    match tail.last() {
        Some(last) => last.clone(),
        None => std::env::args()
            .next()
            .unwrap_or_else(|| "solod".to_string()),
    }
}

fn default_watch_dir(lock_file: &Path) -> PathBuf {
    match lock_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
