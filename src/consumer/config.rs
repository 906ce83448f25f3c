/*!
 * Daemon Configuration
 */

use super::backend::BackendKind;
use crate::core::types::{ConsumerId, TransportKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Consumer daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DaemonConfig {
    /// Identity registered with the gate; defaults to the process id
    pub identity: ConsumerId,
    pub transport: TransportKind,
    pub backend: BackendKind,
}

impl DaemonConfig {
    pub fn new(identity: ConsumerId, transport: TransportKind) -> Self {
        Self {
            identity,
            transport,
            backend: BackendKind::default(),
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Load from environment, keeping defaults for unset or unparsable values
    ///
    /// Environment variables:
    /// - OFFLOAD_IDENTITY: decimal consumer identity
    /// - OFFLOAD_TRANSPORT: QUEUE | CONTROL | DATAGRAM (or PROCFS | IOCTL | NL)
    /// - OFFLOAD_BACKEND: raid6 | marker
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("OFFLOAD_IDENTITY") {
            match raw.trim().parse::<ConsumerId>() {
                Ok(identity) if identity != 0 => config.identity = identity,
                _ => warn!(value = %raw, "Ignoring OFFLOAD_IDENTITY"),
            }
        }

        if let Ok(raw) = std::env::var("OFFLOAD_TRANSPORT") {
            match raw.trim().parse() {
                Ok(transport) => config.transport = transport,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring OFFLOAD_TRANSPORT"),
            }
        }

        if let Ok(raw) = std::env::var("OFFLOAD_BACKEND") {
            match raw.parse() {
                Ok(backend) => config.backend = backend,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring OFFLOAD_BACKEND"),
            }
        }

        config
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            identity: std::process::id(),
            transport: TransportKind::Queue,
            backend: BackendKind::Raid6,
        }
    }
}
