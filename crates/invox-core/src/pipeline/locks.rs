//! In-process mutual exclusion for extraction runs on the same file.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::models::FileId;

/// Registry of files with a run in flight.
///
/// Only coordinates runs inside one process. Separate processes sharing a
/// database still race, and the last run to persist wins.
#[derive(Default)]
pub struct FileLocks {
    busy: Mutex<HashSet<FileId>>,
    released: Condvar,
}

/// Held for the duration of one run; releases the file on drop.
pub struct FileLockGuard<'a> {
    locks: &'a FileLocks,
    file: FileId,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    // The set is valid after any panic, so poisoning is ignored.
    fn busy(&self) -> MutexGuard<'_, HashSet<FileId>> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until no other run holds `file`, then claim it.
    pub fn acquire(&self, file: FileId) -> FileLockGuard<'_> {
        let mut busy = self.busy();
        while busy.contains(&file) {
            debug!(file = %file, "Waiting for in-flight run");
            busy = self
                .released
                .wait(busy)
                .unwrap_or_else(PoisonError::into_inner);
        }
        busy.insert(file);
        FileLockGuard { locks: self, file }
    }

    #[cfg(test)]
    fn is_locked(&self, file: FileId) -> bool {
        self.busy().contains(&file)
    }
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.busy().remove(&self.file);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_releases_on_drop() {
        let locks = FileLocks::new();
        let file = FileId::new();

        let guard = locks.acquire(file);
        assert!(locks.is_locked(file));

        // Other files are independent
        let other = FileId::new();
        drop(locks.acquire(other));
        assert!(!locks.is_locked(other));

        drop(guard);
        assert!(!locks.is_locked(file));
        drop(locks.acquire(file));
    }

    #[test]
    fn test_runs_on_same_file_are_serialized() {
        let locks = Arc::new(FileLocks::new());
        let file = FileId::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = locks.acquire(file);
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(!locks.is_locked(file));
    }
}
