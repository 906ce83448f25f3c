/*!
 * Consumer Port
 * Everything the unprivileged consumer is allowed to touch, bound to one identity
 */

use super::gate::{ConfigGate, GateOutcome};
use crate::core::errors::OffloadResult;
use crate::core::types::{ConsumerId, CorrelationToken, TransportKind};
use crate::ipc::{
    BufferView, ControlPayload, DatagramEndpoint, DescriptorView, Mapping, SharedRegion, Transports,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ConsumerPort {
    identity: ConsumerId,
    region: SharedRegion,
    transports: Transports,
    gate: Arc<ConfigGate>,
    stopped: Arc<AtomicBool>,
}

impl ConsumerPort {
    pub(crate) fn new(
        identity: ConsumerId,
        region: SharedRegion,
        transports: Transports,
        gate: Arc<ConfigGate>,
        stopped: Arc<AtomicBool>,
    ) -> Self {
        Self {
            identity,
            region,
            transports,
            gate,
            stopped,
        }
    }

    pub fn identity(&self) -> ConsumerId {
        self.identity
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Write one raw line to the configuration gate
    pub fn configure(&self, line: &str) -> OffloadResult<GateOutcome> {
        self.gate.write(line)
    }

    /// Register this port's identity and `transport` with the gate
    pub fn register(&self, transport: TransportKind) -> OffloadResult<GateOutcome> {
        self.gate.write(&format!("identity={}", self.identity))?;
        self.gate.write(&format!("transport={}", transport))
    }

    /// Gate state byte: `'u'` while a job is in flight
    pub fn job_state(&self) -> char {
        self.gate.read()
    }

    pub fn map(&self, offset: usize) -> OffloadResult<Mapping> {
        self.region.map(self.identity, offset)
    }

    pub fn map_descriptor(&self) -> OffloadResult<DescriptorView> {
        self.region.map_descriptor(self.identity)
    }

    /// Map buffer `index` (0-based)
    pub fn map_buffer(&self, index: usize) -> OffloadResult<BufferView> {
        self.region.map_buffer(self.identity, index)
    }

    pub fn copy_from_buffer(&self, index: usize, dst: &mut [u8]) -> OffloadResult<usize> {
        self.region.copy_from_buffer(self.identity, index, dst)
    }

    pub fn copy_to_buffer(&self, index: usize, src: &[u8]) -> OffloadResult<usize> {
        self.region.copy_to_buffer(self.identity, index, src)
    }

    /// Queue transport: block until a job is published
    pub fn read_job(&self) -> OffloadResult<CorrelationToken> {
        let bytes = self.transports.queue.read_job()?;
        Ok(CorrelationToken::new(usize::from_ne_bytes(bytes)))
    }

    /// Queue transport: raw job endpoint read
    pub fn read_job_bytes(&self) -> OffloadResult<[u8; CorrelationToken::WIDTH]> {
        self.transports.queue.read_job()
    }

    /// Queue transport: raw signal endpoint write
    pub fn signal_done(&self, bytes: &[u8]) -> OffloadResult<usize> {
        self.transports.queue.signal_done(bytes)
    }

    /// Control transport call
    pub fn control(&self, payload: &mut ControlPayload) -> OffloadResult<()> {
        self.transports.control.control(payload)
    }

    /// Bind this port's identity on the datagram bus
    pub fn bind_datagram(&self) -> OffloadResult<DatagramEndpoint> {
        self.transports.datagram.bind(self.identity)
    }
}
