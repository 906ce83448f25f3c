/*!
 * Offload Channel
 *
 * Wires the descriptor slot, memory-sharing layer, transports,
 * configuration gate and controller of one channel together.
 *
 * # Lifecycle
 *
 * `start()` creates every endpoint and holds the submission lock. The
 * consumer configures identity and transport through the gate, which opens
 * the lock. `stop()` fails all blocked waiters and every later submission.
 */

mod controller;
mod gate;
mod port;

pub use controller::OffloadController;
pub use gate::{ConfigGate, GateOutcome, GateState};
pub use port::ConsumerPort;

use crate::core::config::ChannelConfig;
use crate::core::errors::OffloadResult;
use crate::core::sync::Semaphore;
use crate::core::types::{ConsumerId, Size};
use crate::ipc::{BufferHandle, DescriptorSlot, SharedRegion, Transports};
use crate::monitoring::{ChannelStats, ChannelStatsSnapshot};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Offload channel handle; clones share the same channel
///
/// # Performance
/// - Cache-line aligned; all state lives behind `Arc`s
#[repr(C, align(64))]
#[derive(Debug, Clone)]
pub struct OffloadChannel {
    controller: Arc<OffloadController>,
    gate: Arc<ConfigGate>,
    region: SharedRegion,
    transports: Transports,
    stats: Arc<ChannelStats>,
    stopped: Arc<AtomicBool>,
}

impl OffloadChannel {
    /// Create the endpoints and hold the submission lock until configured
    pub fn start(config: ChannelConfig) -> Self {
        let stats = Arc::new(ChannelStats::new());
        let stopped = Arc::new(AtomicBool::new(false));
        let submission = Arc::new(Semaphore::new("submission", 0));
        let slot = Arc::new(DescriptorSlot::new());
        let identity = Arc::new(OnceLock::new());
        let active = Arc::new(OnceLock::new());
        let transports = Transports::new();

        let region = SharedRegion::new(
            slot.clone(),
            identity.clone(),
            config.contiguous_map_pages,
            stats.clone(),
        );
        let gate = Arc::new(ConfigGate::new(
            identity.clone(),
            active.clone(),
            transports.clone(),
            submission.clone(),
            slot.clone(),
            stats.clone(),
            config.config_line_capacity,
        ));

        info!(
            degenerate_policy = %config.degenerate_policy,
            max_descriptor_buffers = config.max_descriptor_buffers,
            contiguous_ceiling = region.contiguous_ceiling(),
            "Offload channel started, awaiting configuration"
        );

        let controller = Arc::new(OffloadController::new(
            config,
            submission,
            slot,
            identity,
            active,
            stats.clone(),
            stopped.clone(),
        ));

        Self {
            controller,
            gate,
            region,
            transports,
            stats,
            stopped,
        }
    }

    /// Offload one job; see [`OffloadController::submit`]
    pub fn submit(
        &self,
        buffer_count: usize,
        buffer_length: Size,
        buffer_refs: &[BufferHandle],
    ) -> OffloadResult<()> {
        self.controller.submit(buffer_count, buffer_length, buffer_refs)
    }

    /// Write one line to the configuration gate
    pub fn configure(&self, line: &str) -> OffloadResult<GateOutcome> {
        self.gate.write(line)
    }

    /// Gate state byte: `'n'` idle, `'u'` job in flight
    pub fn state(&self) -> char {
        self.gate.read()
    }

    pub fn gate(&self) -> &ConfigGate {
        &self.gate
    }

    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    pub fn transports(&self) -> &Transports {
        &self.transports
    }

    pub fn config(&self) -> &ChannelConfig {
        self.controller.config()
    }

    /// Port for the consumer running as `identity`
    pub fn consumer_port(&self, identity: ConsumerId) -> ConsumerPort {
        ConsumerPort::new(
            identity,
            self.region.clone(),
            self.transports.clone(),
            self.gate.clone(),
            self.stopped.clone(),
        )
    }

    /// Fail every wait currently blocked in a transport. An interrupted
    /// submission returns `Interrupted` and retires its descriptor.
    pub fn interrupt(&self) -> usize {
        let woken = self.transports.interrupt_all();
        info!(woken, "Channel waits interrupted");
        woken
    }

    /// Stop the channel; blocked and later calls fail with `Interrupted`
    pub fn stop(&self) {
        self.controller.stop();
        self.transports.close_all();
        info!(stats = ?self.stats.snapshot(), "Offload channel stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.controller.is_stopped()
    }

    pub fn stats(&self) -> ChannelStatsSnapshot {
        self.stats.snapshot()
    }
}
