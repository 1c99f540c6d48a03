//! Instrument handle shared between threads.
//!
//! Channel selection followed by the dependent command must not interleave
//! with another caller's access, so the lock is held for the whole closure
//! passed to [`Shared::with`].

use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable handle to one instrument. Clones share the same lock.
pub struct Shared<I> {
    inner: Arc<Mutex<I>>,
}

impl<I> Clone for Shared<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I> Shared<I> {
    /// Take ownership of `instrument`.
    pub fn new(instrument: I) -> Self {
        Self {
            inner: Arc::new(Mutex::new(instrument)),
        }
    }

    /// Run `f` with exclusive access to the instrument.
    pub fn with<R>(&self, f: impl FnOnce(&mut I) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Like [`with`](Self::with) but gives up instead of blocking when another
    /// caller holds the instrument.
    pub fn try_with<R>(&self, f: impl FnOnce(&mut I) -> R) -> Option<R> {
        self.inner.try_lock().map(|mut guard| f(&mut guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_with_serializes_access() {
        let shared = Shared::new(Vec::<usize>::new());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        // Both pushes land together or not at all
                        shared.with(|log| {
                            log.push(worker);
                            log.push(worker);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let log = shared.with(|log| log.clone());
        assert_eq!(log.len(), 800);
        assert!(log.chunks(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_try_with_while_locked() {
        let shared = Shared::new(0u32);
        let other = shared.clone();
        shared.with(|_| {
            assert_eq!(other.try_with(|value| *value), None);
        });
        assert_eq!(other.try_with(|value| *value), Some(0));
    }
}
