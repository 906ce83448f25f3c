/*!
 * Syndrome Offload Library
 *
 * A synchronous, single-job channel that hands RAID-6 syndrome jobs from a
 * producer to one consumer over a selectable transport, sharing the data
 * buffers without copying them.
 */

pub mod channel;
pub mod consumer;
pub mod core;
pub mod ipc;
pub mod monitoring;

// Re-exports
pub use channel::{ConfigGate, ConsumerPort, GateOutcome, GateState, OffloadChannel, OffloadController};
pub use consumer::{
    BackendKind, ConsumerDaemon, DaemonConfig, MarkerBackend, Raid6Syndrome, SyndromeBackend,
};
pub use crate::core::{
    ChannelConfig, ConsumerId, CorrelationToken, DegenerateJobPolicy, OffloadError, OffloadResult,
    TransportKind,
};
pub use ipc::{
    Backing, BufferArena, BufferHandle, BufferView, ControlPayload, DatagramEndpoint,
    DescriptorView, JobDescriptor, Mapping,
};
pub use monitoring::{init_tracing, ChannelStatsSnapshot};
