/*!
 * Configuration Gate
 *
 * One-shot, monotonic configuration of the channel through `key=value`
 * lines: first the consumer identity, then the transport. Completing
 * configuration installs the transport and opens the submission lock that
 * has been held since the channel started.
 *
 * Accepted keys: `identity` (legacy `pid`) and `transport` (legacy `con`).
 */

use crate::core::errors::{OffloadError, OffloadResult};
use crate::core::limits::{GATE_BUSY, GATE_IDLE, KERNEL_IDENTITY};
use crate::core::sync::Semaphore;
use crate::core::types::{ConsumerId, TransportKind};
use crate::ipc::{ActiveTransport, DescriptorSlot, Transports};
use crate::monitoring::ChannelStats;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Gate progress; never moves backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum GateState {
    Empty,
    IdentitySet {
        identity: ConsumerId,
    },
    Configured {
        identity: ConsumerId,
        transport: TransportKind,
    },
}

/// Effect of one accepted input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    IdentitySet(ConsumerId),
    Configured {
        identity: ConsumerId,
        transport: TransportKind,
    },
    /// Well-formed but without effect in the current state
    Ignored { key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Identity,
    Transport,
    Unknown,
}

impl Key {
    fn parse(raw: &str) -> Self {
        match raw {
            "identity" | "pid" => Key::Identity,
            "transport" | "con" => Key::Transport,
            _ => Key::Unknown,
        }
    }
}

/// Configuration gate
pub struct ConfigGate {
    /// Configuration lock; distinct from the submission lock
    state: Mutex<GateState>,
    identity: Arc<OnceLock<ConsumerId>>,
    active: Arc<OnceLock<ActiveTransport>>,
    transports: Transports,
    submission: Arc<Semaphore>,
    slot: Arc<DescriptorSlot>,
    stats: Arc<ChannelStats>,
    line_capacity: usize,
}

impl ConfigGate {
    pub(crate) fn new(
        identity: Arc<OnceLock<ConsumerId>>,
        active: Arc<OnceLock<ActiveTransport>>,
        transports: Transports,
        submission: Arc<Semaphore>,
        slot: Arc<DescriptorSlot>,
        stats: Arc<ChannelStats>,
        line_capacity: usize,
    ) -> Self {
        Self {
            state: Mutex::new(GateState::Empty),
            identity,
            active,
            transports,
            submission,
            slot,
            stats,
            line_capacity,
        }
    }

    /// Apply one configuration line
    ///
    /// Rejections are logged and counted; the gate state is unchanged by
    /// any rejected input.
    pub fn write(&self, input: &str) -> OffloadResult<GateOutcome> {
        let result = self.apply(input);
        if let Err(err) = &result {
            self.stats.inc_config_rejections();
            warn!(input = %input.trim_end(), error = %err, "Configuration input rejected");
        }
        result
    }

    fn apply(&self, input: &str) -> OffloadResult<GateOutcome> {
        let mut state = self.state.lock();
        if let GateState::Configured {
            identity,
            transport,
        } = *state
        {
            return Err(OffloadError::AlreadyConfigured {
                identity,
                transport,
            });
        }

        if input.len() > self.line_capacity {
            return Err(OffloadError::Overflow {
                length: input.len(),
                capacity: self.line_capacity,
            });
        }

        let line = input.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        let (raw_key, raw_value) = line
            .split_once('=')
            .ok_or_else(|| OffloadError::Malformed(line.to_string()))?;
        let value = raw_value.trim();

        match (Key::parse(raw_key.trim()), *state) {
            (Key::Identity, GateState::Empty) => {
                let identity = parse_identity(raw_key.trim(), value)?;
                // Empty is left exactly once, so the cell is still unset
                let _ = self.identity.set(identity);
                *state = GateState::IdentitySet { identity };
                info!(identity, "Consumer identity set");
                Ok(GateOutcome::IdentitySet(identity))
            }
            (Key::Transport, GateState::IdentitySet { identity }) => {
                let transport: TransportKind =
                    value.parse().map_err(|_| OffloadError::InvalidValue {
                        key: raw_key.trim().to_string(),
                        value: value.to_string(),
                    })?;
                let _ = self.active.set(self.transports.select(transport));
                *state = GateState::Configured {
                    identity,
                    transport,
                };
                self.submission.release();
                info!(identity, %transport, "Channel configured, submissions open");
                Ok(GateOutcome::Configured {
                    identity,
                    transport,
                })
            }
            (_, current) => {
                debug!(key = raw_key, state = ?current, "Configuration key ignored");
                Ok(GateOutcome::Ignored {
                    key: raw_key.trim().to_string(),
                })
            }
        }
    }

    /// `'u'` while a job is in flight, `'n'` otherwise
    pub fn read(&self) -> char {
        if self.slot.is_active() {
            GATE_BUSY
        } else {
            GATE_IDLE
        }
    }

    pub fn state(&self) -> GateState {
        *self.state.lock()
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state(), GateState::Configured { .. })
    }
}

fn parse_identity(key: &str, value: &str) -> OffloadResult<ConsumerId> {
    match value.parse::<ConsumerId>() {
        Ok(identity) if identity != KERNEL_IDENTITY => Ok(identity),
        _ => Err(OffloadError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl std::fmt::Debug for ConfigGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigGate")
            .field("state", &self.state())
            .field("line_capacity", &self.line_capacity)
            .finish()
    }
}
