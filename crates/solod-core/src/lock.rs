//! Lock-file election for single-instance coordination.
//!
//! The first process to take a non-blocking exclusive `fcntl` record lock
//! on the well-known lock file becomes the leader. Everyone else observes
//! the conflict, recovers the holder's PID for diagnostics, and runs the
//! follower path. The decision is made exactly once at startup; there is
//! no retry and no mid-flight role change.
//!
//! The lock is advisory and OS-enforced: it is released automatically when
//! the owning process exits, so there is no explicit unlock anywhere.

use crate::error::{Result, SolodError};
use nix::fcntl::{fcntl, FcntlArg};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of the one-shot election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// This process owns the lock and is the sole running instance.
    Leader,
    /// Another process holds the lock. `holder_pid` is best-effort: the
    /// holder can exit between the failed lock attempt and the owner
    /// query, in which case it is `None`.
    Follower { holder_pid: Option<i32> },
}

/// An open lock file plus the outcome of the election.
///
/// The descriptor is held for the entire process lifetime; dropping this
/// before exit would release a leader's lock and let a second leader in.
#[derive(Debug)]
pub struct InstanceLock {
    /// Never read back; exists to keep the locked descriptor open.
    _file: File,
    path: PathBuf,
    role: Role,
}

impl InstanceLock {
    /// Open (creating if absent) the lock file and attempt the exclusive
    /// lock once, without blocking.
    ///
    /// Returns `Role::Leader` or `Role::Follower` inside the lock handle;
    /// any I/O failure other than "lock held elsewhere" is a fatal
    /// `Setup` error.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SolodError::setup(format!("open lock file {}", path.display()), e))?;

        // Exclusive write lock over the whole file (l_len = 0).
        let mut fl = whole_file_write_lock();

        let role = match fcntl(file.as_raw_fd(), FcntlArg::F_SETLK(&fl)) {
            Ok(_) => {
                debug!("Acquired instance lock at {}", path.display());
                write_pid(&mut file, &path);
                Role::Leader
            }
            Err(nix::errno::Errno::EAGAIN) | Err(nix::errno::Errno::EACCES) => {
                let holder_pid = query_holder(&file, &mut fl);
                debug!(
                    "Instance lock at {} held elsewhere (PID {:?})",
                    path.display(),
                    holder_pid
                );
                Role::Follower { holder_pid }
            }
            Err(errno) => {
                return Err(SolodError::setup_errno(
                    format!("lock {}", path.display()),
                    errno,
                ));
            }
        };

        Ok(Self {
            _file: file,
            path,
            role,
        })
    }

    /// The role decided at acquisition time.
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Whether this process won the election.
    pub fn is_leader(&self) -> bool {
        matches!(self.role, Role::Leader)
    }

    /// PID of the current lock holder, if this process is a follower and
    /// the owner query succeeded.
    pub fn holder_pid(&self) -> Option<i32> {
        match self.role {
            Role::Follower { holder_pid } => holder_pid,
            Role::Leader => None,
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// An `flock` descriptor covering the whole file from offset 0.
fn whole_file_write_lock() -> libc::flock {
    libc::flock {
        l_type: libc::F_WRLCK as libc::c_short,
        l_whence: libc::SEEK_SET as libc::c_short,
        l_start: 0,
        l_len: 0, // whole file
        l_pid: 0,
    }
}

/// Ask the kernel which process blocks the lock. On return `l_type` is
/// `F_UNLCK` if the holder vanished in the meantime.
fn query_holder(file: &File, fl: &mut libc::flock) -> Option<i32> {
    fl.l_type = libc::F_WRLCK as libc::c_short;
    match fcntl(file.as_raw_fd(), FcntlArg::F_GETLK(fl)) {
        Ok(_) if fl.l_type != libc::F_UNLCK as libc::c_short => Some(fl.l_pid as i32),
        Ok(_) => None,
        Err(errno) => {
            warn!("F_GETLK failed: {}", errno);
            None
        }
    }
}

/// Record the leader's PID so the lock file doubles as a PID file.
/// Failure here is logged, not fatal: the lock itself already holds.
fn write_pid(file: &mut File, path: &Path) {
    let pid = std::process::id();
    if let Err(e) = file
        .set_len(0)
        .and_then(|_| writeln!(file, "{}", pid))
        .and_then(|_| file.flush())
    {
        warn!("Failed to write PID to {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_acquire_becomes_leader() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("solod.lock");

        let lock = InstanceLock::acquire(&lock_path).unwrap();
        assert!(lock.is_leader());
        assert_eq!(lock.role(), &Role::Leader);
        assert_eq!(lock.holder_pid(), None);
    }

    #[test]
    fn test_leader_writes_pid_file() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("solod.lock");

        let _lock = InstanceLock::acquire(&lock_path).unwrap();

        let contents = std::fs::read_to_string(&lock_path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_reacquire_same_process_stays_leader() {
        // fcntl record locks are per-process: a second attempt from the
        // same process succeeds rather than conflicting. Cross-process
        // conflict is covered by the binary's integration tests.
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("solod.lock");

        let first = InstanceLock::acquire(&lock_path).unwrap();
        let second = InstanceLock::acquire(&lock_path).unwrap();
        assert!(first.is_leader());
        assert!(second.is_leader());
    }

    #[test]
    fn test_unopenable_path_is_setup_error() {
        let temp = TempDir::new().unwrap();
        // A directory cannot be opened for writing as a lock file.
        let result = InstanceLock::acquire(temp.path());
        match result {
            Err(SolodError::Setup { .. }) => {}
            other => panic!("Expected Setup error, got: {:?}", other),
        }
    }

    #[test]
    fn test_lock_file_created_if_absent() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("fresh.lock");
        assert!(!lock_path.exists());

        let _lock = InstanceLock::acquire(&lock_path).unwrap();
        assert!(lock_path.exists());
    }
}
