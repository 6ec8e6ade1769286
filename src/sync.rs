//! A counting semaphore for the connection admission cap. Grounded in
//! `original_source/src/semaphore.hpp`'s post/wait pair, expressed with
//! `parking_lot::{Mutex, Condvar}` instead of POSIX `sem_t` since the admission cap
//! is an in-process value with no cross-process sharing requirement.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    /// Blocks until a unit is available, then takes it.
    pub fn acquire(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cond.wait(&mut count);
        }
        *count -= 1;
    }

    /// Like `acquire`, but gives up (returning `false`) if `poll` returns `true`
    /// before a unit becomes available. `poll` is re-checked roughly every
    /// `poll_interval`, which lets the listener loop notice cancellation without a
    /// dedicated wakeup channel for the semaphore itself.
    pub fn acquire_unless(&self, poll_interval: Duration, mut poll: impl FnMut() -> bool) -> bool {
        let mut count = self.count.lock();
        loop {
            if *count > 0 {
                *count -= 1;
                return true;
            }
            if poll() {
                return false;
            }
            let deadline = Instant::now() + poll_interval;
            let _ = self.cond.wait_until(&mut count, deadline);
        }
    }

    pub fn release(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.cond.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acquire_blocks_until_release() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = Arc::clone(&sem);
        let handle = std::thread::spawn(move || {
            sem2.acquire();
        });
        std::thread::sleep(Duration::from_millis(20));
        sem.release();
        handle.join().unwrap();
    }

    #[test]
    fn acquire_unless_gives_up_when_poll_returns_true() {
        let sem = Semaphore::new(0);
        let mut calls = 0;
        let acquired = sem.acquire_unless(Duration::from_millis(5), || {
            calls += 1;
            calls >= 2
        });
        assert!(!acquired);
    }
}
