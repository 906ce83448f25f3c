/*!
 * Synchronization Primitives
 *
 * Blocking rendezvous building blocks for the offload transports:
 * - `Handshake`: an explicit state value guarded by a mutex and condvar
 * - `Semaphore`: counting permits with RAII release, built on `Handshake`
 *
 * All waits block the OS thread. There are no timeouts; a wait ends when
 * its predicate holds, when the primitive is interrupted, or when it is
 * closed.
 */

mod handshake;
mod semaphore;

pub use handshake::{Handshake, WaitError, WaitResult};
pub use semaphore::{Semaphore, SemaphorePermit};
