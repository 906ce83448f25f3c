/*!
 * Transports
 *
 * Three interchangeable ways to hand the live job to the consumer and wait
 * for its completion:
 * - `queue`: read the token from a job endpoint, write it back to a signal endpoint
 * - `control`: one blocking control call per job with an in/out marker payload
 * - `datagram`: unicast token datagrams between identities
 *
 * All three endpoints exist from channel start; the configuration gate
 * selects exactly one, which is then fixed for the channel lifetime.
 */

mod control;
mod datagram;
mod queue;

pub use control::{ControlPayload, ControlTransport};
pub use datagram::{Datagram, DatagramEndpoint, DatagramTransport};
pub use queue::QueueTransport;

use crate::core::errors::OffloadResult;
use crate::core::types::{ConsumerId, CorrelationToken, JobSeq, TransportKind};
use std::sync::Arc;

/// What the producer hands a transport for one round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTicket {
    pub seq: JobSeq,
    pub token: CorrelationToken,
    pub consumer: ConsumerId,
}

/// Producer half of a transport
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Publish the job, wake the consumer and block until it signals
    /// completion (or the wait fails)
    fn round_trip(&self, ticket: &JobTicket) -> OffloadResult<()>;

    /// Fail every wait currently blocked in this transport
    fn interrupt(&self) -> usize;

    /// Permanently fail all waits
    fn close(&self);
}

/// Endpoints of every transport kind, created at channel start
#[derive(Debug, Clone)]
pub struct Transports {
    pub queue: Arc<QueueTransport>,
    pub control: Arc<ControlTransport>,
    pub datagram: Arc<DatagramTransport>,
}

impl Transports {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(QueueTransport::new()),
            control: Arc::new(ControlTransport::new()),
            datagram: Arc::new(DatagramTransport::new()),
        }
    }

    pub fn select(&self, kind: TransportKind) -> ActiveTransport {
        match kind {
            TransportKind::Queue => ActiveTransport::Queue(self.queue.clone()),
            TransportKind::Control => ActiveTransport::Control(self.control.clone()),
            TransportKind::Datagram => ActiveTransport::Datagram(self.datagram.clone()),
        }
    }

    pub fn interrupt_all(&self) -> usize {
        self.queue.interrupt() + self.control.interrupt() + self.datagram.interrupt()
    }

    pub fn close_all(&self) {
        self.queue.close();
        self.control.close();
        self.datagram.close();
    }
}

impl Default for Transports {
    fn default() -> Self {
        Self::new()
    }
}

/// The transport selected by the configuration gate (enum dispatch)
#[derive(Debug, Clone)]
pub enum ActiveTransport {
    Queue(Arc<QueueTransport>),
    Control(Arc<ControlTransport>),
    Datagram(Arc<DatagramTransport>),
}

impl Transport for ActiveTransport {
    #[inline]
    fn kind(&self) -> TransportKind {
        match self {
            Self::Queue(t) => t.kind(),
            Self::Control(t) => t.kind(),
            Self::Datagram(t) => t.kind(),
        }
    }

    #[inline]
    fn round_trip(&self, ticket: &JobTicket) -> OffloadResult<()> {
        match self {
            Self::Queue(t) => t.round_trip(ticket),
            Self::Control(t) => t.round_trip(ticket),
            Self::Datagram(t) => t.round_trip(ticket),
        }
    }

    fn interrupt(&self) -> usize {
        match self {
            Self::Queue(t) => t.interrupt(),
            Self::Control(t) => t.interrupt(),
            Self::Datagram(t) => t.interrupt(),
        }
    }

    fn close(&self) {
        match self {
            Self::Queue(t) => t.close(),
            Self::Control(t) => t.close(),
            Self::Datagram(t) => t.close(),
        }
    }
}
