/*!
 * Monitoring
 * Channel statistics and structured tracing
 */

mod stats;
mod tracer;

pub use stats::{ChannelStats, ChannelStatsSnapshot};
pub use tracer::{generate_trace_id, init_tracing, span_job, JobSpan};
