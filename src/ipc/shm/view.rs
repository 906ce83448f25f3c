/*!
 * Mapped Views
 * Consumer-side views produced by the shared region
 */

use super::buffer::{Backing, FrameTable};
use crate::core::errors::OffloadResult;
use crate::core::types::{Address, CorrelationToken, JobSeq, Size};
use serde::{Deserialize, Serialize};

/// Descriptor as seen by the consumer at offset 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorView {
    pub seq: JobSeq,
    pub token: CorrelationToken,
    pub buffer_count: usize,
    pub buffer_length: Size,
    pub buffer_addresses: Vec<Address>,
}

impl DescriptorView {
    pub fn is_degenerate(&self) -> bool {
        self.buffer_count == 0
    }
}

/// Buffer k-1 as seen by the consumer at offset k
///
/// The view shares the producer's frames; writes land directly in the
/// producer's buffer. Dropping the view unmaps it.
#[derive(Debug, Clone)]
pub struct BufferView {
    index: usize,
    address: Address,
    backing: Backing,
    table: FrameTable,
}

impl BufferView {
    pub(crate) fn new(index: usize, address: Address, backing: Backing, table: FrameTable) -> Self {
        Self {
            index,
            address,
            backing,
            table,
        }
    }

    /// 0-based buffer index inside the descriptor
    pub fn index(&self) -> usize {
        self.index
    }

    /// Producer-side address of the mapped buffer
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn backing(&self) -> Backing {
        self.backing
    }

    pub fn len(&self) -> Size {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of separately mapped ranges (pages for paged buffers)
    pub fn mapped_ranges(&self) -> usize {
        self.table.frames().len()
    }

    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> OffloadResult<()> {
        self.table.read_at(offset, dst)
    }

    pub fn write_at(&self, offset: usize, src: &[u8]) -> OffloadResult<()> {
        self.table.write_at(offset, src)
    }

    pub fn fill(&self, byte: u8) {
        self.table.fill(byte);
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.table.to_vec()
    }
}

/// Result of mapping one offset
#[derive(Debug, Clone)]
pub enum Mapping {
    Descriptor(DescriptorView),
    Buffer(BufferView),
}

impl Mapping {
    pub fn into_descriptor(self) -> Option<DescriptorView> {
        match self {
            Mapping::Descriptor(view) => Some(view),
            Mapping::Buffer(_) => None,
        }
    }

    pub fn into_buffer(self) -> Option<BufferView> {
        match self {
            Mapping::Buffer(view) => Some(view),
            Mapping::Descriptor(_) => None,
        }
    }
}
