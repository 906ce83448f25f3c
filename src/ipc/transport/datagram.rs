/*!
 * Datagram Transport
 *
 * Unicast datagrams between the producer (identity 0) and consumer
 * endpoints bound to an identity. Every inbox holds a single frame: a new
 * delivery overwrites an unread one and each receive consumes exactly one.
 *
 * Frames are bincode-encoded `Datagram`s carrying one native word.
 */

use super::{JobTicket, Transport};
use crate::core::errors::{OffloadError, OffloadResult};
use crate::core::limits::KERNEL_IDENTITY;
use crate::core::sync::{Handshake, WaitResult};
use crate::core::types::{ConsumerId, CorrelationToken, TransportKind};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Wire frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datagram {
    pub sender: ConsumerId,
    pub token: CorrelationToken,
}

impl Datagram {
    pub fn encode(&self) -> OffloadResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(frame: &[u8]) -> OffloadResult<Self> {
        Ok(bincode::deserialize(frame)?)
    }
}

/// Single-slot inbox
#[derive(Debug)]
struct Inbox {
    slot: Handshake<Option<Vec<u8>>>,
}

impl Inbox {
    fn new(name: &'static str) -> Self {
        Self {
            slot: Handshake::new(name, None),
        }
    }

    /// Store `frame`; returns true if an unread frame was overwritten
    fn deliver(&self, frame: Vec<u8>) -> bool {
        self.slot.update(|slot| slot.replace(frame).is_some())
    }

    fn receive(&self) -> WaitResult<Vec<u8>> {
        self.slot
            .transition(|slot| slot.is_some(), |slot| slot.take())
            .map(Option::unwrap_or_default)
    }

    fn clear(&self) {
        self.slot.set(None);
    }
}

type Registry = DashMap<ConsumerId, Arc<Inbox>, RandomState>;

/// Datagram bus and the producer's endpoint
#[derive(Debug)]
pub struct DatagramTransport {
    kernel_inbox: Arc<Inbox>,
    endpoints: Arc<Registry>,
    producer: Mutex<()>,
}

impl DatagramTransport {
    pub fn new() -> Self {
        Self {
            kernel_inbox: Arc::new(Inbox::new("datagram-kernel")),
            endpoints: Arc::new(DashMap::with_hasher(RandomState::new())),
            producer: Mutex::new(()),
        }
    }

    /// Bind a consumer endpoint to `identity`
    pub fn bind(&self, identity: ConsumerId) -> OffloadResult<DatagramEndpoint> {
        if identity == KERNEL_IDENTITY {
            return Err(OffloadError::ProtocolViolation(format!(
                "identity {} is reserved for the producer",
                identity
            )));
        }

        match self.endpoints.entry(identity) {
            Entry::Occupied(_) => Err(OffloadError::ProtocolViolation(format!(
                "identity {} is already bound",
                identity
            ))),
            Entry::Vacant(vacant) => {
                let inbox = Arc::new(Inbox::new("datagram-endpoint"));
                vacant.insert(inbox.clone());
                info!(identity, "Datagram endpoint bound");
                Ok(DatagramEndpoint {
                    identity,
                    inbox,
                    kernel_inbox: self.kernel_inbox.clone(),
                    registry: self.endpoints.clone(),
                })
            }
        }
    }

    pub fn is_bound(&self, identity: ConsumerId) -> bool {
        self.endpoints.contains_key(&identity)
    }

    /// Delivery callback of the producer's endpoint; accepts raw frames
    pub fn deliver(&self, frame: Vec<u8>) {
        if self.kernel_inbox.deliver(frame) {
            debug!("Unread datagram overwritten");
        }
    }

    fn unicast(&self, identity: ConsumerId, datagram: &Datagram) -> OffloadResult<()> {
        let inbox = self
            .endpoints
            .get(&identity)
            .map(|entry| entry.value().clone())
            .ok_or(OffloadError::Unreachable(identity))?;
        inbox.deliver(datagram.encode()?);
        Ok(())
    }
}

impl Default for DatagramTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for DatagramTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Datagram
    }

    fn round_trip(&self, ticket: &JobTicket) -> OffloadResult<()> {
        let _producer = self.producer.lock();
        self.kernel_inbox.clear();

        self.unicast(
            ticket.consumer,
            &Datagram {
                sender: KERNEL_IDENTITY,
                token: ticket.token,
            },
        )?;
        debug!(seq = ticket.seq, consumer = ticket.consumer, "Job datagram sent");

        let reply = Datagram::decode(&self.kernel_inbox.receive()?)?;
        if reply.sender != ticket.consumer {
            warn!(expected = ticket.consumer, actual = reply.sender, "Reply from unexpected identity");
            return Err(OffloadError::IdentityMismatch {
                expected: ticket.consumer,
                actual: reply.sender,
            });
        }
        if reply.token != ticket.token {
            warn!(expected = %ticket.token, actual = %reply.token, "Reply token mismatch");
            return Err(OffloadError::AddressMismatch {
                expected: ticket.token.value(),
                actual: reply.token.value(),
            });
        }
        Ok(())
    }

    fn interrupt(&self) -> usize {
        let endpoints: usize = self
            .endpoints
            .iter()
            .map(|entry| entry.value().slot.interrupt())
            .sum();
        self.kernel_inbox.slot.interrupt() + endpoints
    }

    fn close(&self) {
        self.kernel_inbox.slot.close();
        for entry in self.endpoints.iter() {
            entry.value().slot.close();
        }
    }
}

/// Consumer endpoint; unbinds its identity when dropped
#[derive(Debug)]
pub struct DatagramEndpoint {
    identity: ConsumerId,
    inbox: Arc<Inbox>,
    kernel_inbox: Arc<Inbox>,
    registry: Arc<Registry>,
}

impl DatagramEndpoint {
    pub fn identity(&self) -> ConsumerId {
        self.identity
    }

    /// Block until a datagram arrives
    pub fn recv(&self) -> OffloadResult<Datagram> {
        let frame = self.inbox.receive()?;
        Datagram::decode(&frame)
    }

    /// Send `token` to the producer, tagged with this endpoint's identity
    pub fn reply(&self, token: CorrelationToken) -> OffloadResult<()> {
        let frame = Datagram {
            sender: self.identity,
            token,
        }
        .encode()?;
        if self.kernel_inbox.deliver(frame) {
            debug!(identity = self.identity, "Unread datagram overwritten");
        }
        Ok(())
    }
}

impl Drop for DatagramEndpoint {
    fn drop(&mut self) {
        let inbox = &self.inbox;
        self.registry
            .remove_if(&self.identity, |_, bound| Arc::ptr_eq(bound, inbox));
        debug!(identity = self.identity, "Datagram endpoint unbound");
    }
}
