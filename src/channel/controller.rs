/*!
 * Offload Controller
 *
 * Producer entry point. A submission takes the submission lock (blocking
 * until the channel is configured), packs the descriptor into the single
 * slot, runs the round trip on the configured transport, releases the
 * descriptor and drops the lock.
 *
 * An interrupted round trip leaves the consumer's view of the job
 * undefined, so its descriptor is retired instead of released and is
 * never reused.
 */

use crate::core::config::{ChannelConfig, DegenerateJobPolicy};
use crate::core::errors::{OffloadError, OffloadResult};
use crate::core::sync::Semaphore;
use crate::core::types::{ConsumerId, Size};
use crate::ipc::{ActiveTransport, BufferHandle, DescriptorSlot, JobDescriptor, JobTicket, Transport};
use crate::monitoring::{span_job, ChannelStats};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

pub struct OffloadController {
    config: ChannelConfig,
    submission: Arc<Semaphore>,
    slot: Arc<DescriptorSlot>,
    identity: Arc<OnceLock<ConsumerId>>,
    active: Arc<OnceLock<ActiveTransport>>,
    stats: Arc<ChannelStats>,
    stopped: Arc<AtomicBool>,
}

impl OffloadController {
    pub(crate) fn new(
        config: ChannelConfig,
        submission: Arc<Semaphore>,
        slot: Arc<DescriptorSlot>,
        identity: Arc<OnceLock<ConsumerId>>,
        active: Arc<OnceLock<ActiveTransport>>,
        stats: Arc<ChannelStats>,
        stopped: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            submission,
            slot,
            identity,
            active,
            stats,
            stopped,
        }
    }

    fn ensure_running(&self) -> OffloadResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            Err(OffloadError::Interrupted("channel stopped".into()))
        } else {
            Ok(())
        }
    }

    /// Offload one syndrome job and block until the consumer completes it
    pub fn submit(
        &self,
        buffer_count: usize,
        buffer_length: Size,
        buffer_refs: &[BufferHandle],
    ) -> OffloadResult<()> {
        self.ensure_running()?;
        let _permit = self.submission.acquire()?;
        self.ensure_running()?;

        let (transport, consumer) = match (self.active.get(), self.identity.get()) {
            (Some(transport), Some(&consumer)) => (transport, consumer),
            _ => {
                return Err(OffloadError::ProtocolViolation(
                    "submission lock opened before configuration completed".into(),
                ))
            }
        };

        let seq = self.stats.inc_submitted();
        let span = span_job(seq, transport.kind());
        let _entered = span.enter();

        let descriptor = JobDescriptor::pack(
            buffer_count,
            buffer_length,
            buffer_refs,
            self.config.max_descriptor_buffers,
        );
        span.record_buffers(descriptor.buffer_count());

        if descriptor.is_degenerate() {
            self.stats.inc_degenerate();
            match self.config.degenerate_policy {
                DegenerateJobPolicy::ShortCircuit => {
                    let requested = descriptor.requested_count();
                    descriptor.release();
                    self.stats.inc_failed();
                    let err = OffloadError::AllocationFailure { requested };
                    span.record_error(err.kind());
                    warn!(seq, requested, "Degenerate job refused");
                    return Err(err);
                }
                DegenerateJobPolicy::Proceed => {
                    warn!(seq, requested = descriptor.requested_count(), "Submitting degenerate job");
                }
            }
        }

        let token = self.slot.install(seq, descriptor)?;
        let result = transport.round_trip(&JobTicket {
            seq,
            token,
            consumer,
        });

        match &result {
            Ok(()) => {
                self.release_live();
                self.stats.inc_completed();
                span.record_success();
            }
            Err(OffloadError::Interrupted(reason)) => {
                if self.slot.retire().is_some() {
                    self.stats.inc_leaked();
                    error!(seq, reason = %reason, "Round trip interrupted, descriptor retired");
                }
                self.stats.inc_failed();
                span.record_error("interrupted");
            }
            Err(err) => {
                self.release_live();
                self.stats.inc_failed();
                span.record_error(err.kind());
                warn!(seq, error = %err, "Round trip failed");
            }
        }

        result
    }

    fn release_live(&self) {
        if let Some(descriptor) = self.slot.take() {
            descriptor.release();
        }
    }

    /// Mark stopped and fail every waiter blocked on the submission lock
    pub(crate) fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.submission.close();
            info!("Offload controller stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

impl std::fmt::Debug for OffloadController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffloadController")
            .field("config", &self.config)
            .field("live_seq", &self.slot.live_seq())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
