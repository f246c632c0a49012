// lock.rs — Exclusive advisory lock next to the ledger file.
//
// The scheduler is expected never to overlap runs, but a manual `msync run`
// during a scheduled one would race two writers on the same file. Every
// mutating command holds `<ledger>.lock` via flock(LOCK_EX | LOCK_NB) for its
// whole lifetime; the kernel releases the lock when the file is closed, so a
// crashed process never leaves a stale lock behind.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::LedgerError;

/// Held lock on a ledger. Released on drop.
#[derive(Debug)]
pub struct LedgerLock {
    _file: File,
    path: PathBuf,
}

impl LedgerLock {
    /// Acquire the lock for the ledger at `ledger_path` without blocking.
    ///
    /// Fails with [`LedgerError::Locked`] if another process holds it.
    pub fn acquire(ledger_path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = lock_path(ledger_path.as_ref());
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| LedgerError::io(dir, source))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| LedgerError::io(&path, source))?;

        match try_flock_exclusive(&file) {
            Ok(true) => {
                tracing::debug!(path = %path.display(), "ledger lock acquired");
                Ok(Self { _file: file, path })
            }
            Ok(false) => Err(LedgerError::Locked { path }),
            Err(source) => Err(LedgerError::io(&path, source)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(ledger_path: &Path) -> PathBuf {
    let mut name = ledger_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "ledger".into());
    name.push(".lock");
    ledger_path.with_file_name(name)
}

/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if another
/// open file description already holds it.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fd is a valid descriptor owned by `file` for the duration
        // of the call.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}
