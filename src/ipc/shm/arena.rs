/*!
 * Buffer Arena
 * Producer-side allocator that issues page-aligned addresses for buffers
 */

use super::buffer::{Backing, BufferHandle};
use crate::core::errors::OffloadResult;
use crate::core::limits::{ARENA_BASE_ADDRESS, PAGE_SIZE};
use crate::core::types::{Address, Size};
use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Arena usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaStats {
    pub buffers: usize,
    pub bytes_allocated: usize,
}

/// Buffer arena
///
/// # Performance
/// - Cache-line aligned; the registry is sharded so lookups from many
///   producer threads do not contend
#[repr(C, align(64))]
#[derive(Clone)]
pub struct BufferArena {
    buffers: Arc<DashMap<Address, BufferHandle, RandomState>>,
    next_address: Arc<AtomicUsize>,
    bytes_allocated: Arc<AtomicUsize>,
}

impl BufferArena {
    pub fn new() -> Self {
        info!(base = ARENA_BASE_ADDRESS, page_size = PAGE_SIZE, "Buffer arena initialized");
        Self {
            buffers: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_address: Arc::new(AtomicUsize::new(ARENA_BASE_ADDRESS)),
            bytes_allocated: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Allocate a zeroed buffer of `length` bytes
    ///
    /// Addresses are page aligned and separated by an unused guard page.
    pub fn allocate(&self, length: Size, backing: Backing) -> OffloadResult<BufferHandle> {
        let span = length.div_ceil(PAGE_SIZE).max(1) * PAGE_SIZE + PAGE_SIZE;
        let address = self.next_address.fetch_add(span, Ordering::Relaxed);

        let handle = BufferHandle::allocate(address, length, backing)?;
        self.buffers.insert(address, handle.clone());
        self.bytes_allocated.fetch_add(length, Ordering::Relaxed);

        debug!(address = format_args!("{:#x}", address), length, ?backing, "Allocated buffer");
        Ok(handle)
    }

    /// Allocate `count` buffers of identical length and backing
    pub fn allocate_set(
        &self,
        count: usize,
        length: Size,
        backing: Backing,
    ) -> OffloadResult<Vec<BufferHandle>> {
        (0..count).map(|_| self.allocate(length, backing)).collect()
    }

    pub fn get(&self, address: Address) -> Option<BufferHandle> {
        self.buffers.get(&address).map(|entry| entry.value().clone())
    }

    /// Drop the arena's reference; frames live on while any handle or
    /// mapped view still refers to them
    pub fn free(&self, address: Address) -> bool {
        match self.buffers.remove(&address) {
            Some((_, handle)) => {
                self.bytes_allocated.fetch_sub(handle.len(), Ordering::Relaxed);
                debug!(address = format_args!("{:#x}", address), "Freed buffer");
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            buffers: self.buffers.len(),
            bytes_allocated: self.bytes_allocated.load(Ordering::Relaxed),
        }
    }
}

impl Default for BufferArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_page_aligned_and_distinct() {
        let arena = BufferArena::new();
        let a = arena.allocate(100, Backing::Paged).unwrap();
        let b = arena.allocate(PAGE_SIZE * 2, Backing::Contiguous).unwrap();
        assert_eq!(a.address() % PAGE_SIZE, 0);
        assert_eq!(b.address() % PAGE_SIZE, 0);
        assert!(b.address() >= a.address() + 2 * PAGE_SIZE);
    }

    #[test]
    fn test_free_keeps_live_handles_valid() {
        let arena = BufferArena::new();
        let buf = arena.allocate(64, Backing::Paged).unwrap();
        buf.fill(3);
        assert!(arena.free(buf.address()));
        assert!(!arena.free(buf.address()));
        assert!(arena.get(buf.address()).is_none());
        assert_eq!(buf.to_vec(), vec![3u8; 64]);
        assert_eq!(arena.stats().bytes_allocated, 0);
    }

    #[test]
    fn test_allocate_set() {
        let arena = BufferArena::new();
        let set = arena.allocate_set(5, 4096, Backing::Paged).unwrap();
        assert_eq!(set.len(), 5);
        assert_eq!(
            arena.stats(),
            ArenaStats {
                buffers: 5,
                bytes_allocated: 5 * 4096
            }
        );
    }
}
