use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;

/// A guard that holds an exclusive lock on one checkout path.
/// Lock is released when dropped.
#[derive(Debug)]
pub struct CheckoutLock {
    file: File,
}

fn open_lock_file(lock_path: &Path) -> io::Result<File> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
}

impl CheckoutLock {
    /// Acquire an exclusive lock, blocking until it is free.
    /// Creates the lock file and parent dirs if needed.
    pub fn acquire(lock_path: &Path) -> io::Result<Self> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    /// Try to acquire lock without blocking.
    #[cfg(test)]
    /// Returns None if lock is held elsewhere.
    pub fn try_acquire(lock_path: &Path) -> io::Result<Option<Self>> {
        let file = open_lock_file(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for CheckoutLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("subdir").join("checkout.git-lock");

        assert!(!lock_path.exists());

        let lock = CheckoutLock::acquire(&lock_path).unwrap();

        assert!(lock_path.exists());

        drop(lock);
    }

    #[test]
    fn test_try_acquire_returns_none_when_locked() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("checkout.git-lock");

        let _lock = CheckoutLock::acquire(&lock_path).unwrap();
        let result = CheckoutLock::try_acquire(&lock_path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("checkout.git-lock");

        {
            let _lock = CheckoutLock::acquire(&lock_path).unwrap();
            assert!(CheckoutLock::try_acquire(&lock_path).unwrap().is_none());
        }
        let lock = CheckoutLock::try_acquire(&lock_path).unwrap();
        assert!(lock.is_some());
    }

    #[test]
    fn test_different_paths_do_not_contend() {
        let dir = tempdir().unwrap();

        let _main = CheckoutLock::acquire(&dir.path().join("main.git-lock")).unwrap();
        let dev = CheckoutLock::try_acquire(&dir.path().join("dev.git-lock")).unwrap();
        assert!(dev.is_some());
    }

    #[test]
    fn test_acquire_blocks_until_released() {
        let dir = tempdir().unwrap();
        let lock_path = Arc::new(dir.path().join("checkout.git-lock"));
        let barrier = Arc::new(Barrier::new(2));

        let lock_path_clone = Arc::clone(&lock_path);
        let barrier_clone = Arc::clone(&barrier);

        let holder = thread::spawn(move || {
            let lock = CheckoutLock::acquire(&lock_path_clone).unwrap();
            barrier_clone.wait();
            thread::sleep(Duration::from_millis(150));
            drop(lock);
        });

        let waiter = thread::spawn(move || {
            barrier.wait();
            let start = Instant::now();
            let _lock = CheckoutLock::acquire(&lock_path).unwrap();
            start.elapsed()
        });

        holder.join().unwrap();
        let waited = waiter.join().unwrap();
        assert!(
            waited >= Duration::from_millis(100),
            "acquire returned after {:?} while the lock was held",
            waited
        );
    }
}
