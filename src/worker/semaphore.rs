//! Counting semaphore with RAII permits

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
pub struct Semaphore {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl Semaphore {
    /// # Panics
    ///
    /// Panics if `permits` is zero.
    pub fn new(permits: usize) -> Self {
        assert!(permits > 0, "semaphore needs at least one permit");
        Self {
            available: Mutex::new(permits),
            released: Condvar::new(),
            capacity: permits,
        }
    }

    /// Blocks until a permit is free. The permit is returned on drop and may
    /// move to another thread.
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut available = self.available.lock();
        while *available == 0 {
            self.released.wait(&mut available);
        }
        *available -= 1;
        Permit {
            semaphore: Arc::clone(self),
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(Permit {
            semaphore: Arc::clone(self),
        })
    }

    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self) {
        *self.available.lock() += 1;
        self.released.notify_one();
    }
}

#[derive(Debug)]
pub struct Permit {
    semaphore: Arc<Semaphore>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_permits_are_bounded() {
        let semaphore = Arc::new(Semaphore::new(2));
        let first = semaphore.acquire();
        let _second = semaphore.acquire();
        assert!(semaphore.try_acquire().is_none());

        drop(first);
        assert_eq!(semaphore.available(), 1);
        assert!(semaphore.try_acquire().is_some());
        assert_eq!(semaphore.available(), 1);
    }

    #[test]
    fn test_acquire_waits_for_release() {
        let semaphore = Arc::new(Semaphore::new(1));
        let permit = semaphore.acquire();

        let waiter = {
            let semaphore = Arc::clone(&semaphore);
            thread::spawn(move || {
                let _permit = semaphore.acquire();
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        drop(permit);
        waiter.join().unwrap();
        assert_eq!(semaphore.available(), 1);
    }
}
