//! Advisory file locks.
//!
//! On Unix these are `flock(2)` locks on a dedicated lock file, released when
//! the guard drops. Elsewhere the guard only keeps the lock file open.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[derive(Debug)]
pub(crate) struct FileLock {
    file: File,
}

impl FileLock {
    /// Blocks until a shared lock is held.
    pub(crate) fn shared(path: &Path) -> io::Result<Self> {
        Self::acquire(path, false)
    }

    /// Blocks until an exclusive lock is held.
    pub(crate) fn exclusive(path: &Path) -> io::Result<Self> {
        Self::acquire(path, true)
    }

    fn acquire(path: &Path, exclusive: bool) -> io::Result<Self> {
        let file = open_lock_file(path)?;
        #[cfg(unix)]
        flock(&file, if exclusive { libc::LOCK_EX } else { libc::LOCK_SH })?;
        #[cfg(not(unix))]
        let _ = exclusive;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        let _ = flock(&self.file, libc::LOCK_UN);
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(unix)]
fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        // SAFETY: the descriptor belongs to `file`, which outlives the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn exclusive_lock_blocks_second_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.token.lock");

        let guard = FileLock::exclusive(&path).unwrap();
        let (tx, rx) = mpsc::channel();
        let contender = {
            let path = path.clone();
            thread::spawn(move || {
                let _g = FileLock::exclusive(&path).unwrap();
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        contender.join().unwrap();
    }

    #[test]
    fn shared_locks_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.token.lock");

        let _a = FileLock::shared(&path).unwrap();
        let _b = FileLock::shared(&path).unwrap();
    }

    #[test]
    fn lock_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.token.lock");
        let _g = FileLock::shared(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777 & !0o600, 0);
    }
}
