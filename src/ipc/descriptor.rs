/*!
 * Job Descriptor
 *
 * The unit of work handed to the consumer: buffer count, common buffer
 * length and an ordered array of buffer references. Packing copies the
 * references element-wise into a freshly allocated array; buffer contents
 * are never copied.
 *
 * A descriptor that cannot be allocated is packed as *degenerate*
 * (`buffer_count == 0`, no reference array) instead of failing.
 */

use super::shm::BufferHandle;
use crate::core::errors::{OffloadError, OffloadResult};
use crate::core::types::{Address, CorrelationToken, JobSeq, Size};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

/// Packed job
#[derive(Debug)]
pub struct JobDescriptor {
    buffer_count: usize,
    buffer_length: Size,
    buffers: Option<Box<[BufferHandle]>>,
    requested: usize,
}

impl JobDescriptor {
    /// Pack `buffer_count` references from `buffer_refs`
    ///
    /// Returns a degenerate descriptor when `buffer_refs` holds fewer than
    /// `buffer_count` references, when `buffer_count` exceeds
    /// `max_buffers`, or when the reference array cannot be allocated.
    pub fn pack(
        buffer_count: usize,
        buffer_length: Size,
        buffer_refs: &[BufferHandle],
        max_buffers: usize,
    ) -> Self {
        if buffer_count > max_buffers || buffer_refs.len() < buffer_count {
            warn!(
                buffer_count,
                supplied = buffer_refs.len(),
                max_buffers,
                "Cannot pack descriptor, using degenerate descriptor"
            );
            return Self::degenerate(buffer_count, buffer_length);
        }

        let mut refs = Vec::new();
        if refs.try_reserve_exact(buffer_count).is_err() {
            warn!(buffer_count, "Descriptor allocation failed, using degenerate descriptor");
            return Self::degenerate(buffer_count, buffer_length);
        }
        refs.extend(buffer_refs[..buffer_count].iter().cloned());

        debug!(buffer_count, buffer_length, "Packed descriptor");
        Self {
            buffer_count,
            buffer_length,
            buffers: Some(refs.into_boxed_slice()),
            requested: buffer_count,
        }
    }

    fn degenerate(requested: usize, buffer_length: Size) -> Self {
        Self {
            buffer_count: 0,
            buffer_length,
            buffers: None,
            requested,
        }
    }

    /// Free the reference array. The buffers themselves are untouched.
    pub fn release(self) {
        debug!(
            buffer_count = self.buffer_count,
            degenerate = self.is_degenerate(),
            "Released descriptor"
        );
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    pub fn buffer_length(&self) -> Size {
        self.buffer_length
    }

    /// Buffer count the caller asked for
    pub fn requested_count(&self) -> usize {
        self.requested
    }

    pub fn is_degenerate(&self) -> bool {
        self.buffers.is_none()
    }

    pub fn buffers(&self) -> &[BufferHandle] {
        self.buffers.as_deref().unwrap_or(&[])
    }

    /// Reference `index` (0-based)
    pub fn buffer(&self, index: usize) -> Option<&BufferHandle> {
        self.buffers().get(index)
    }

    pub fn buffer_addresses(&self) -> Vec<Address> {
        self.buffers().iter().map(BufferHandle::address).collect()
    }
}

#[derive(Debug)]
struct LiveJob {
    seq: JobSeq,
    descriptor: JobDescriptor,
}

impl LiveJob {
    /// Address of the job's own allocation
    fn token(&self) -> CorrelationToken {
        CorrelationToken::new(self as *const Self as usize)
    }
}

/// The controller's single descriptor slot
///
/// Every installed job gets its own heap allocation whose address is the
/// job's correlation token. Retired jobs keep their allocation until the
/// slot is dropped, so the token of an abandoned job is never handed out
/// again while a late completion for it may still arrive.
#[derive(Debug, Default)]
pub struct DescriptorSlot {
    live: RwLock<Option<Box<LiveJob>>>,
    retired: Mutex<Vec<Box<LiveJob>>>,
}

impl DescriptorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `descriptor` the live job and return its correlation token
    pub fn install(&self, seq: JobSeq, descriptor: JobDescriptor) -> OffloadResult<CorrelationToken> {
        let mut live = self.live.write();
        if let Some(current) = live.as_ref() {
            return Err(OffloadError::ProtocolViolation(format!(
                "job {} installed while job {} is live",
                seq, current.seq
            )));
        }
        let job = Box::new(LiveJob { seq, descriptor });
        let token = job.token();
        *live = Some(job);
        Ok(token)
    }

    /// Remove the live job, handing its descriptor back for release
    pub fn take(&self) -> Option<JobDescriptor> {
        self.live.write().take().map(|job| job.descriptor)
    }

    /// Remove the live job and keep it out of circulation until the slot
    /// is dropped. Returns the job's sequence number.
    pub fn retire(&self) -> Option<JobSeq> {
        let job = self.live.write().take()?;
        let seq = job.seq;
        self.retired.lock().push(job);
        Some(seq)
    }

    pub fn with_live<R>(
        &self,
        f: impl FnOnce(JobSeq, CorrelationToken, &JobDescriptor) -> R,
    ) -> Option<R> {
        self.live
            .read()
            .as_ref()
            .map(|job| f(job.seq, job.token(), &job.descriptor))
    }

    pub fn is_active(&self) -> bool {
        self.live.read().is_some()
    }

    pub fn live_seq(&self) -> Option<JobSeq> {
        self.live.read().as_ref().map(|job| job.seq)
    }

    pub fn live_token(&self) -> Option<CorrelationToken> {
        self.live.read().as_ref().map(|job| job.token())
    }

    /// Number of descriptors abandoned by interrupted jobs
    pub fn retired_count(&self) -> usize {
        self.retired.lock().len()
    }
}
