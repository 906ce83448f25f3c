/*!
 * Memory Sharing
 * Zero-copy buffer sharing between the producer and the consumer
 */

mod arena;
mod buffer;
mod region;
mod view;

pub use arena::{ArenaStats, BufferArena};
pub use buffer::{Backing, BufferHandle};
pub use region::SharedRegion;
pub use view::{BufferView, DescriptorView, Mapping};
