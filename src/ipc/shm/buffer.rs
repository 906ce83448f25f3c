/*!
 * Shared Buffers
 * Frame-backed byte buffers shared between producer and consumer views
 */

use crate::core::errors::{OffloadError, OffloadResult};
use crate::core::limits::PAGE_SIZE;
use crate::core::types::{Address, Size};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// One physical frame. Producer handles and consumer views hold the same
/// `Arc`, so writes through either are visible to both.
pub(crate) type Frame = RwLock<Box<[u8]>>;

/// Allocation capability of a buffer, decides how it is mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backing {
    /// Virtually contiguous; one frame per page, mapped page by page
    Paged,
    /// Physically contiguous; one frame, mapped in a single range
    Contiguous,
}

pub(crate) fn alloc_frame(size: usize) -> OffloadResult<Arc<Frame>> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(size)
        .map_err(|_| OffloadError::AllocationFailure { requested: size })?;
    bytes.resize(size, 0);
    Ok(Arc::new(RwLock::new(bytes.into_boxed_slice())))
}

/// Frames plus the logical length they carry
#[derive(Clone)]
pub(crate) struct FrameTable {
    frames: Box<[Arc<Frame>]>,
    frame_size: usize,
    length: Size,
}

impl FrameTable {
    pub(crate) fn new(frames: Box<[Arc<Frame>]>, frame_size: usize, length: Size) -> Self {
        Self {
            frames,
            frame_size,
            length,
        }
    }

    pub(crate) fn len(&self) -> Size {
        self.length
    }

    pub(crate) fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub(crate) fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    pub(crate) fn frame(&self, index: usize) -> Option<&Arc<Frame>> {
        self.frames.get(index)
    }

    fn check(&self, offset: usize, size: usize) -> OffloadResult<()> {
        match offset.checked_add(size) {
            Some(end) if end <= self.length => Ok(()),
            _ => Err(OffloadError::InvalidRange {
                offset,
                size,
                length: self.length,
            }),
        }
    }

    /// Split `offset..offset+size` into per-frame pieces:
    /// (frame index, range inside the frame, range inside the caller slice)
    fn spans(&self, offset: usize, size: usize) -> impl Iterator<Item = (usize, Range<usize>, Range<usize>)> + '_ {
        let frame_size = self.frame_size.max(1);
        let mut cursor = offset;
        let end = offset + size;
        std::iter::from_fn(move || {
            if cursor >= end {
                return None;
            }
            let index = cursor / frame_size;
            let start = cursor % frame_size;
            let take = (frame_size - start).min(end - cursor);
            let caller = (cursor - offset)..(cursor - offset + take);
            cursor += take;
            Some((index, start..start + take, caller))
        })
    }

    pub(crate) fn read_at(&self, offset: usize, dst: &mut [u8]) -> OffloadResult<()> {
        self.check(offset, dst.len())?;
        for (index, inner, outer) in self.spans(offset, dst.len()) {
            let frame = self.frames[index].read();
            dst[outer].copy_from_slice(&frame[inner]);
        }
        Ok(())
    }

    pub(crate) fn write_at(&self, offset: usize, src: &[u8]) -> OffloadResult<()> {
        self.check(offset, src.len())?;
        for (index, inner, outer) in self.spans(offset, src.len()) {
            let mut frame = self.frames[index].write();
            frame[inner].copy_from_slice(&src[outer]);
        }
        Ok(())
    }

    pub(crate) fn fill(&self, byte: u8) {
        for (index, inner, _) in self.spans(0, self.length) {
            self.frames[index].write()[inner].fill(byte);
        }
    }

    pub(crate) fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.length];
        for (index, inner, outer) in self.spans(0, self.length) {
            out[outer].copy_from_slice(&self.frames[index].read()[inner]);
        }
        out
    }
}

impl std::fmt::Debug for FrameTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTable")
            .field("frames", &self.frames.len())
            .field("frame_size", &self.frame_size)
            .field("length", &self.length)
            .finish()
    }
}

#[derive(Debug)]
struct SharedBuffer {
    address: Address,
    backing: Backing,
    table: FrameTable,
}

/// Producer-side reference to a shared buffer
///
/// Cloning copies the reference, never the contents.
#[derive(Debug, Clone)]
pub struct BufferHandle {
    inner: Arc<SharedBuffer>,
}

impl BufferHandle {
    pub(crate) fn allocate(address: Address, length: Size, backing: Backing) -> OffloadResult<Self> {
        let (frame_size, frame_count) = match backing {
            Backing::Paged => (PAGE_SIZE, length.div_ceil(PAGE_SIZE)),
            Backing::Contiguous => (length.max(1), 1),
        };

        let mut frames = Vec::new();
        frames
            .try_reserve_exact(frame_count)
            .map_err(|_| OffloadError::AllocationFailure {
                requested: frame_count,
            })?;
        for _ in 0..frame_count {
            frames.push(alloc_frame(frame_size)?);
        }

        Ok(Self {
            inner: Arc::new(SharedBuffer {
                address,
                backing,
                table: FrameTable::new(frames.into_boxed_slice(), frame_size, length),
            }),
        })
    }

    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn len(&self) -> Size {
        self.inner.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn backing(&self) -> Backing {
        self.inner.backing
    }

    /// Number of pages the buffer spans
    pub fn page_count(&self) -> usize {
        self.len().div_ceil(PAGE_SIZE)
    }

    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> OffloadResult<()> {
        self.inner.table.read_at(offset, dst)
    }

    pub fn write_at(&self, offset: usize, src: &[u8]) -> OffloadResult<()> {
        self.inner.table.write_at(offset, src)
    }

    pub fn fill(&self, byte: u8) {
        self.inner.table.fill(byte);
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.inner.table.to_vec()
    }

    /// Frame backing page `page` of a paged buffer
    pub(crate) fn translate_page(&self, page: usize) -> Option<Arc<Frame>> {
        match self.inner.backing {
            Backing::Paged => self.inner.table.frame(page).cloned(),
            Backing::Contiguous => None,
        }
    }

    pub(crate) fn table(&self) -> &FrameTable {
        &self.inner.table
    }

    /// True if both handles refer to the same buffer
    pub fn same_buffer(&self, other: &BufferHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paged_write_crosses_frames() {
        let buf = BufferHandle::allocate(0x1000, 3 * PAGE_SIZE, Backing::Paged).unwrap();
        assert_eq!(buf.table().frames().len(), 3);

        let data = vec![0xab; 100];
        buf.write_at(PAGE_SIZE - 50, &data).unwrap();

        let mut back = vec![0u8; 100];
        buf.read_at(PAGE_SIZE - 50, &mut back).unwrap();
        assert_eq!(back, data);
        assert_eq!(buf.table().frame(0).unwrap().read()[PAGE_SIZE - 1], 0xab);
        assert_eq!(buf.table().frame(1).unwrap().read()[49], 0xab);
        assert_eq!(buf.table().frame(1).unwrap().read()[50], 0);
    }

    #[test]
    fn test_contiguous_single_frame() {
        let buf = BufferHandle::allocate(0x1000, 5000, Backing::Contiguous).unwrap();
        assert_eq!(buf.table().frames().len(), 1);
        assert_eq!(buf.page_count(), 2);
        assert!(buf.translate_page(0).is_none());
    }

    #[test]
    fn test_out_of_range_access() {
        let buf = BufferHandle::allocate(0x1000, 16, Backing::Paged).unwrap();
        let err = buf.write_at(10, &[0u8; 8]).unwrap_err();
        assert_eq!(
            err,
            OffloadError::InvalidRange {
                offset: 10,
                size: 8,
                length: 16
            }
        );
    }

    #[test]
    fn test_clone_shares_contents() {
        let a = BufferHandle::allocate(0x1000, 64, Backing::Paged).unwrap();
        let b = a.clone();
        b.fill(7);
        assert!(a.same_buffer(&b));
        assert_eq!(a.to_vec(), vec![7u8; 64]);
    }
}
