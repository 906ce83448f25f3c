/*!
 * Consumer
 * The unprivileged side of the channel: syndrome backends and the daemon
 */

pub mod backend;
mod config;
mod daemon;

pub use backend::{gf_mul2, BackendKind, MarkerBackend, Raid6Syndrome, SyndromeBackend};
pub use config::DaemonConfig;
pub use daemon::{ConsumerDaemon, ConsumerSession};
