use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// Session-wide lock for resources the caller shares between tasks
///
/// A dispatch session creates exactly one `TaskLock` and lends it to every
/// worker. When tasks run in parallel it is a real mutex; in serial mode it is
/// a no-op with the same contract, so task code never needs to know which one
/// it received.
///
/// Guards release on drop, which covers early returns and panics. A mutex
/// poisoned by a panicking holder is recovered on the next acquire.
#[derive(Debug)]
pub enum TaskLock {
    Mutex(Mutex<()>),
    NoOp,
}

/// Scoped acquisition of a [`TaskLock`].
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct TaskLockGuard<'a> {
    _held: Option<MutexGuard<'a, ()>>,
}

impl TaskLock {
    pub fn create(parallel: bool) -> Self {
        if parallel {
            TaskLock::Mutex(Mutex::new(()))
        } else {
            TaskLock::NoOp
        }
    }

    /// Whether this lock actually excludes concurrent holders.
    pub fn is_real(&self) -> bool {
        matches!(self, TaskLock::Mutex(_))
    }

    /// Block until the lock is held.
    pub fn acquire(&self) -> TaskLockGuard<'_> {
        let held = match self {
            TaskLock::Mutex(mutex) => Some(mutex.lock().unwrap_or_else(PoisonError::into_inner)),
            TaskLock::NoOp => None,
        };
        TaskLockGuard { _held: held }
    }

    /// Acquire without blocking; `None` if another worker holds it.
    pub fn try_acquire(&self) -> Option<TaskLockGuard<'_>> {
        match self {
            TaskLock::Mutex(mutex) => match mutex.try_lock() {
                Ok(held) => Some(TaskLockGuard { _held: Some(held) }),
                Err(TryLockError::Poisoned(poisoned)) => Some(TaskLockGuard {
                    _held: Some(poisoned.into_inner()),
                }),
                Err(TryLockError::WouldBlock) => None,
            },
            TaskLock::NoOp => Some(TaskLockGuard { _held: None }),
        }
    }

    /// Run `f` while holding the lock.
    pub fn with_lock<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.acquire();
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    fn fail_while_holding(lock: &TaskLock) -> anyhow::Result<()> {
        let _guard = lock.acquire();
        anyhow::bail!("transformation failed mid-hold")
    }

    #[test]
    fn test_create_variants() {
        assert!(TaskLock::create(true).is_real());
        assert!(!TaskLock::create(false).is_real());
    }

    #[test]
    fn test_real_lock_excludes_second_holder() {
        let lock = TaskLock::create(true);
        let guard = lock.acquire();
        assert!(lock.try_acquire().is_none());
        drop(guard);
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_noop_lock_never_blocks() {
        let lock = TaskLock::create(false);
        let _first = lock.acquire();
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_released_after_error_mid_hold() {
        let lock = TaskLock::create(true);
        assert!(fail_while_holding(&lock).is_err());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_released_and_recovered_after_panic_mid_hold() {
        let lock = TaskLock::create(true);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            lock.with_lock(|| panic!("worker died holding the lock"))
        }));
        assert!(outcome.is_err());
        assert!(lock.try_acquire().is_some());
        let _again = lock.acquire();
    }

    #[test]
    fn test_with_lock_serializes_threads() {
        let lock = TaskLock::create(true);
        let counter = Mutex::new(Vec::new());

        crossbeam::thread::scope(|s| {
            for worker in 0..4 {
                let lock = &lock;
                let counter = &counter;
                s.spawn(move |_| {
                    for step in 0..50 {
                        lock.with_lock(|| {
                            let mut log = counter.lock().unwrap();
                            log.push((worker, step));
                            assert!(lock.try_acquire().is_none());
                        });
                    }
                });
            }
        })
        .unwrap();

        assert_eq!(counter.into_inner().unwrap().len(), 200);
    }
}
