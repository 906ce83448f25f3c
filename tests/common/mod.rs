/*!
 * Shared helpers for the integration tests
 */

#![allow(dead_code)]

use syndrome_offload::consumer::gf_mul2;
use syndrome_offload::{
    Backing, BufferArena, BufferHandle, ChannelConfig, ConsumerId, OffloadChannel, TransportKind,
};

/// Channel configured for `identity` on `transport`
pub fn configured_channel(
    identity: ConsumerId,
    transport: TransportKind,
    config: ChannelConfig,
) -> OffloadChannel {
    let channel = OffloadChannel::start(config);
    channel
        .configure(&format!("identity={}", identity))
        .unwrap();
    channel
        .configure(&format!("transport={}", transport))
        .unwrap();
    channel
}

pub fn buffers(count: usize, length: usize, backing: Backing) -> Vec<BufferHandle> {
    BufferArena::new()
        .allocate_set(count, length, backing)
        .unwrap()
}

/// P and Q computed independently as XOR_z D_z and XOR_z g^z * D_z
pub fn reference_pq(data: &[Vec<u8>]) -> (Vec<u8>, Vec<u8>) {
    let length = data[0].len();
    let mut p = vec![0u8; length];
    let mut q = vec![0u8; length];
    for (z, disk) in data.iter().enumerate() {
        for i in 0..length {
            let mut term = disk[i];
            for _ in 0..z {
                term = gf_mul2(term);
            }
            p[i] ^= disk[i];
            q[i] ^= term;
        }
    }
    (p, q)
}
