/*!
 * Inter-Process Communication
 * Job descriptors, zero-copy memory sharing and the offload transports
 */

pub mod descriptor;
pub mod shm;
pub mod transport;

pub use descriptor::{DescriptorSlot, JobDescriptor};
pub use shm::{
    ArenaStats, Backing, BufferArena, BufferHandle, BufferView, DescriptorView, Mapping,
    SharedRegion,
};
pub use transport::{
    ActiveTransport, ControlPayload, ControlTransport, Datagram, DatagramEndpoint,
    DatagramTransport, JobTicket, QueueTransport, Transport, Transports,
};
