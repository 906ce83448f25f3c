/*!
 * Counting Semaphore
 * Blocking permits on top of a `Handshake<usize>`, released by RAII guard
 */

use super::handshake::{Handshake, WaitResult};

/// Counting semaphore
///
/// A semaphore created with zero permits behaves as a lock that is held
/// from construction until someone calls `release()`.
#[derive(Debug)]
pub struct Semaphore {
    permits: Handshake<usize>,
}

impl Semaphore {
    pub fn new(name: &'static str, permits: usize) -> Self {
        Self {
            permits: Handshake::new(name, permits),
        }
    }

    /// Block until a permit is available and take it
    pub fn acquire(&self) -> WaitResult<SemaphorePermit<'_>> {
        self.acquire_raw()?;
        Ok(SemaphorePermit { semaphore: self })
    }

    /// Take a permit without a guard; pair with `release()`
    pub fn acquire_raw(&self) -> WaitResult<()> {
        self.permits.transition(|n| *n > 0, |n| *n -= 1)
    }

    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        let taken = self.permits.update(|n| {
            if *n > 0 {
                *n -= 1;
                true
            } else {
                false
            }
        });
        taken.then_some(SemaphorePermit { semaphore: self })
    }

    /// Return one permit and wake waiters
    pub fn release(&self) {
        self.permits.update(|n| *n += 1);
    }

    pub fn available(&self) -> usize {
        self.permits.get()
    }

    pub fn waiters(&self) -> usize {
        self.permits.waiters()
    }

    pub fn interrupt(&self) -> usize {
        self.permits.interrupt()
    }

    pub fn close(&self) {
        self.permits.close();
    }
}

/// Permit that returns itself to the semaphore on drop
#[must_use = "dropping the permit releases it immediately"]
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl SemaphorePermit<'_> {
    /// Consume the permit without returning it
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
