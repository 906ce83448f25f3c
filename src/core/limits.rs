/*!
 * Channel Limits and Constants
 *
 * Centralized location for the sizes, ceilings and wire constants of the
 * offload channel.
 *
 * - Values include a rationale comment
 * - [LINUX-COMPAT] marks values that mirror the host kernel
 */

// =============================================================================
// MEMORY SHARING
// =============================================================================

/// Page size used for paged mappings and arena address alignment
/// [LINUX-COMPAT] x86_64 base page
pub const PAGE_SIZE: usize = 4096;

/// Maximum pages a physically contiguous buffer may span when mapped
/// in a single range operation
pub const CONTIGUOUS_MAP_MAX_PAGES: usize = 16;

/// Byte ceiling derived from [`CONTIGUOUS_MAP_MAX_PAGES`]
pub const CONTIGUOUS_MAP_CEILING: usize = CONTIGUOUS_MAP_MAX_PAGES * PAGE_SIZE;

/// First synthetic address handed out by the buffer arena
/// Keeps buffer addresses clearly apart from small integers in logs
pub const ARENA_BASE_ADDRESS: usize = 0x1000_0000;

// =============================================================================
// JOB DESCRIPTOR
// =============================================================================

/// Widest descriptor the packer will allocate
/// Wider requests produce a degenerate descriptor instead of a huge
/// reference array
pub const MAX_DESCRIPTOR_BUFFERS: usize = 256;

/// Smallest buffer count of a job that carries data plus P and Q
pub const MIN_SYNDROME_BUFFERS: usize = 3;

// =============================================================================
// CONFIGURATION GATE
// =============================================================================

/// Capacity of the configuration line buffer (bytes)
/// Longer writes fail with Overflow
pub const CONFIG_LINE_CAPACITY: usize = 40;

/// Gate state byte when no job is in flight
pub const GATE_IDLE: char = 'n';

/// Gate state byte while a job is in flight
pub const GATE_BUSY: char = 'u';

// =============================================================================
// TRANSPORTS
// =============================================================================

/// Size of the control call payload
pub const CONTROL_PAYLOAD_LEN: usize = 5;

/// Marker carried by every valid control payload (NUL terminated)
pub const CONTROL_MARKER: [u8; CONTROL_PAYLOAD_LEN] = *b"flag\0";

/// Identity the producer side uses as sender on the datagram bus
/// [LINUX-COMPAT] netlink port id of the kernel
pub const KERNEL_IDENTITY: u32 = 0;

/// Marker written by the marker backend at the start of the last buffer
pub const DONE_MARKER: &[u8] = b"done";
