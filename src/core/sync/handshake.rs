/*!
 * Handshake
 *
 * A state value plus a condvar. One side mutates the state and wakes, the
 * other blocks until a predicate over the state holds and then mutates it
 * atomically with the check.
 *
 * # Interruption
 *
 * `interrupt()` bumps a generation counter. Every waiter that entered
 * before the bump returns `WaitError::Interrupted`; later waiters are not
 * affected. `close()` is permanent and fails every current and future wait.
 */

use crate::core::errors::OffloadError;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::debug;

pub type WaitResult<T> = Result<T, WaitError>;

/// Wait operation errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("wait on '{0}' was interrupted")]
    Interrupted(&'static str),

    #[error("'{0}' is closed")]
    Closed(&'static str),
}

impl From<WaitError> for OffloadError {
    fn from(err: WaitError) -> Self {
        OffloadError::Interrupted(err.to_string())
    }
}

struct Cell<S> {
    value: S,
    generation: u64,
    closed: bool,
}

/// State value with blocking transitions
pub struct Handshake<S> {
    name: &'static str,
    cell: Mutex<Cell<S>>,
    changed: Condvar,
    waiters: AtomicUsize,
}

impl<S> Handshake<S> {
    pub fn new(name: &'static str, initial: S) -> Self {
        Self {
            name,
            cell: Mutex::new(Cell {
                value: initial,
                generation: 0,
                closed: false,
            }),
            changed: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Mutate the state and wake all waiters
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut cell = self.cell.lock();
        let result = f(&mut cell.value);
        drop(cell);
        self.changed.notify_all();
        result
    }

    pub fn set(&self, value: S) {
        self.update(|state| *state = value);
    }

    /// Inspect the state without waking anyone
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.cell.lock().value)
    }

    /// Block until `ready` holds, then apply `f` under the same lock
    ///
    /// The predicate is evaluated before the first wait and after every
    /// wake, so a transition that happened before the call is never lost.
    pub fn transition<R>(
        &self,
        mut ready: impl FnMut(&S) -> bool,
        f: impl FnOnce(&mut S) -> R,
    ) -> WaitResult<R> {
        let mut cell = self.cell.lock();
        let generation = cell.generation;
        self.waiters.fetch_add(1, Ordering::Relaxed);

        let outcome = loop {
            if cell.closed {
                break Err(WaitError::Closed(self.name));
            }
            if cell.generation != generation {
                break Err(WaitError::Interrupted(self.name));
            }
            if ready(&cell.value) {
                break Ok(f(&mut cell.value));
            }
            self.changed.wait(&mut cell);
        };

        self.waiters.fetch_sub(1, Ordering::Relaxed);
        drop(cell);
        if outcome.is_ok() {
            self.changed.notify_all();
        }
        outcome
    }

    /// Block until `ready` holds
    pub fn wait_until(&self, ready: impl FnMut(&S) -> bool) -> WaitResult<()> {
        self.transition(ready, |_| ())
    }

    /// Fail every wait currently blocked on this handshake
    ///
    /// Returns the number of waiters that were blocked.
    pub fn interrupt(&self) -> usize {
        let mut cell = self.cell.lock();
        cell.generation = cell.generation.wrapping_add(1);
        let blocked = self.waiters.load(Ordering::Relaxed);
        drop(cell);
        self.changed.notify_all();
        if blocked > 0 {
            debug!(handshake = self.name, blocked, "Interrupted waiters");
        }
        blocked
    }

    /// Permanently fail all current and future waits
    pub fn close(&self) {
        self.cell.lock().closed = true;
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.cell.lock().closed
    }

    /// Number of threads currently blocked in `transition`
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }
}

impl<S: Clone> Handshake<S> {
    pub fn get(&self) -> S {
        self.cell.lock().value.clone()
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for Handshake<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = self.cell.lock();
        f.debug_struct("Handshake")
            .field("name", &self.name)
            .field("state", &cell.value)
            .field("closed", &cell.closed)
            .field("waiters", &self.waiters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_transition_when_already_ready() {
        let hs = Handshake::new("ready", 1u32);
        let seen = hs.transition(|v| *v == 1, |v| {
            *v = 2;
            *v
        });
        assert_eq!(seen, Ok(2));
        assert_eq!(hs.get(), 2);
    }

    #[test]
    fn test_transition_blocks_until_update() {
        let hs = Arc::new(Handshake::new("block", false));
        let waiter = {
            let hs = hs.clone();
            thread::spawn(move || hs.wait_until(|ready| *ready))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(hs.waiters(), 1);
        hs.set(true);

        assert_eq!(waiter.join().unwrap(), Ok(()));
        assert_eq!(hs.waiters(), 0);
    }

    #[test]
    fn test_interrupt_only_hits_current_waiters() {
        let hs = Arc::new(Handshake::new("interrupt", 0u8));
        let waiter = {
            let hs = hs.clone();
            thread::spawn(move || hs.wait_until(|v| *v == 1))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(hs.interrupt(), 1);
        assert_eq!(
            waiter.join().unwrap(),
            Err(WaitError::Interrupted("interrupt"))
        );

        // No waiter present: nothing pending for the next caller
        assert_eq!(hs.interrupt(), 0);
        hs.set(1);
        assert_eq!(hs.wait_until(|v| *v == 1), Ok(()));
    }

    #[test]
    fn test_close_is_permanent() {
        let hs = Handshake::new("closed", ());
        hs.close();
        assert!(hs.is_closed());
        assert_eq!(hs.wait_until(|_| true), Err(WaitError::Closed("closed")));
    }

    #[test]
    fn test_wait_error_maps_to_interrupted() {
        let err: OffloadError = WaitError::Closed("queue").into();
        assert!(matches!(err, OffloadError::Interrupted(_)));
    }
}
