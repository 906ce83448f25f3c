/*!
 * Shared Region
 *
 * Exposes the live descriptor and its buffers to the configured consumer.
 *
 * Offset 0 maps the descriptor, offset k >= 1 maps buffer k-1. Paged
 * buffers are mapped page by page, each page translated to its frame.
 * Contiguous buffers are mapped as one range and are limited to the
 * contiguous ceiling. Views share frames with the producer; nothing is
 * copied except on the explicit copy path.
 */

use super::buffer::{Backing, BufferHandle, FrameTable};
use super::view::{BufferView, DescriptorView, Mapping};
use crate::core::errors::{OffloadError, OffloadResult};
use crate::core::limits::PAGE_SIZE;
use crate::core::types::{ConsumerId, CorrelationToken};
use crate::ipc::descriptor::{DescriptorSlot, JobDescriptor};
use crate::monitoring::ChannelStats;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Memory-sharing layer of one channel
#[derive(Debug, Clone)]
pub struct SharedRegion {
    slot: Arc<DescriptorSlot>,
    identity: Arc<OnceLock<ConsumerId>>,
    contiguous_ceiling: usize,
    stats: Arc<ChannelStats>,
}

impl SharedRegion {
    pub fn new(
        slot: Arc<DescriptorSlot>,
        identity: Arc<OnceLock<ConsumerId>>,
        contiguous_map_pages: usize,
        stats: Arc<ChannelStats>,
    ) -> Self {
        Self {
            slot,
            identity,
            contiguous_ceiling: contiguous_map_pages * PAGE_SIZE,
            stats,
        }
    }

    pub fn contiguous_ceiling(&self) -> usize {
        self.contiguous_ceiling
    }

    fn authorize(&self, consumer: ConsumerId) -> OffloadResult<()> {
        match self.identity.get() {
            // Without an identity no job can have been submitted
            None => Err(OffloadError::NoActiveJob),
            Some(&expected) if expected != consumer => Err(OffloadError::IdentityMismatch {
                expected,
                actual: consumer,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Map `offset` of the live job into `consumer`'s view
    pub fn map(&self, consumer: ConsumerId, offset: usize) -> OffloadResult<Mapping> {
        self.authorize(consumer)?;

        let mapping = self
            .slot
            .with_live(|seq, token, descriptor| {
                if offset == 0 {
                    return Ok(Mapping::Descriptor(describe(seq, token, descriptor)));
                }
                let handle = descriptor
                    .buffer(offset - 1)
                    .ok_or(OffloadError::InvalidOffset {
                        offset,
                        max: descriptor.buffer_count(),
                    })?;
                self.map_handle(offset - 1, handle).map(Mapping::Buffer)
            })
            .ok_or(OffloadError::NoActiveJob)??;

        self.stats.inc_mappings();
        Ok(mapping)
    }

    pub fn map_descriptor(&self, consumer: ConsumerId) -> OffloadResult<DescriptorView> {
        self.map(consumer, 0)?
            .into_descriptor()
            .ok_or_else(|| OffloadError::ProtocolViolation("offset 0 did not map the descriptor".into()))
    }

    /// Map buffer `index` (0-based), i.e. offset `index + 1`
    pub fn map_buffer(&self, consumer: ConsumerId, index: usize) -> OffloadResult<BufferView> {
        self.map(consumer, index + 1)?
            .into_buffer()
            .ok_or_else(|| OffloadError::ProtocolViolation("buffer offset mapped the descriptor".into()))
    }

    fn map_handle(&self, index: usize, handle: &BufferHandle) -> OffloadResult<BufferView> {
        let table = match handle.backing() {
            Backing::Paged => map_paged(handle)?,
            Backing::Contiguous => self.map_contiguous(handle)?,
        };
        debug!(
            index,
            address = format_args!("{:#x}", handle.address()),
            ranges = table.frames().len(),
            backing = ?handle.backing(),
            "Mapped buffer"
        );
        Ok(BufferView::new(index, handle.address(), handle.backing(), table))
    }

    fn map_contiguous(&self, handle: &BufferHandle) -> OffloadResult<FrameTable> {
        if handle.len() > self.contiguous_ceiling {
            return Err(OffloadError::MappingTooLarge {
                requested: handle.len(),
                ceiling: self.contiguous_ceiling,
            });
        }
        Ok(handle.table().clone())
    }

    /// Copy the start of buffer `index` (0-based) into `dst`
    pub fn copy_from_buffer(
        &self,
        consumer: ConsumerId,
        index: usize,
        dst: &mut [u8],
    ) -> OffloadResult<usize> {
        self.authorize(consumer)?;
        self.slot
            .with_live(|_, _, descriptor| {
                lookup(descriptor, index)?.read_at(0, dst)?;
                Ok(dst.len())
            })
            .ok_or(OffloadError::NoActiveJob)?
    }

    /// Copy `src` over the start of buffer `index` (0-based)
    pub fn copy_to_buffer(&self, consumer: ConsumerId, index: usize, src: &[u8]) -> OffloadResult<usize> {
        self.authorize(consumer)?;
        self.slot
            .with_live(|_, _, descriptor| {
                lookup(descriptor, index)?.write_at(0, src)?;
                Ok(src.len())
            })
            .ok_or(OffloadError::NoActiveJob)?
    }
}

fn describe(seq: u64, token: CorrelationToken, descriptor: &JobDescriptor) -> DescriptorView {
    DescriptorView {
        seq,
        token,
        buffer_count: descriptor.buffer_count(),
        buffer_length: descriptor.buffer_length(),
        buffer_addresses: descriptor.buffer_addresses(),
    }
}

fn lookup(descriptor: &JobDescriptor, index: usize) -> OffloadResult<&BufferHandle> {
    descriptor.buffer(index).ok_or(OffloadError::InvalidOffset {
        offset: index,
        max: descriptor.buffer_count().saturating_sub(1),
    })
}

/// Translate every page of a paged buffer to its frame
fn map_paged(handle: &BufferHandle) -> OffloadResult<FrameTable> {
    let pages = handle.page_count();
    let mut frames = Vec::with_capacity(pages);
    for page in 0..pages {
        let frame = handle.translate_page(page).ok_or_else(|| {
            OffloadError::ProtocolViolation(format!(
                "page {} of buffer {:#x} has no frame",
                page,
                handle.address()
            ))
        })?;
        frames.push(frame);
    }
    Ok(FrameTable::new(frames.into_boxed_slice(), PAGE_SIZE, handle.len()))
}
