/*!
 * Channel Configuration
 * Static tunables of an offload channel, loaded from defaults or environment
 */

use super::limits::{CONFIG_LINE_CAPACITY, CONTIGUOUS_MAP_MAX_PAGES, MAX_DESCRIPTOR_BUFFERS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// What the controller does with a job whose descriptor could not be packed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateJobPolicy {
    /// Run the round trip with an empty descriptor; the consumer sees zero
    /// buffers and completes without computing
    #[default]
    Proceed,
    /// Release the descriptor and fail with AllocationFailure before any
    /// transport is touched
    ShortCircuit,
}

impl fmt::Display for DegenerateJobPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proceed => f.write_str("proceed"),
            Self::ShortCircuit => f.write_str("short_circuit"),
        }
    }
}

impl FromStr for DegenerateJobPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proceed" => Ok(Self::Proceed),
            "short_circuit" | "short-circuit" | "fail" => Ok(Self::ShortCircuit),
            other => Err(format!("unknown degenerate job policy '{}'", other)),
        }
    }
}

/// Channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ChannelConfig {
    pub degenerate_policy: DegenerateJobPolicy,
    /// Packer ceiling; wider jobs pack as degenerate descriptors
    pub max_descriptor_buffers: usize,
    /// Page ceiling for single-range mappings of contiguous buffers
    pub contiguous_map_pages: usize,
    pub config_line_capacity: usize,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that refuses degenerate jobs
    pub fn strict() -> Self {
        Self {
            degenerate_policy: DegenerateJobPolicy::ShortCircuit,
            ..Self::default()
        }
    }

    pub fn with_degenerate_policy(mut self, policy: DegenerateJobPolicy) -> Self {
        self.degenerate_policy = policy;
        self
    }

    pub fn with_max_descriptor_buffers(mut self, max: usize) -> Self {
        self.max_descriptor_buffers = max;
        self
    }

    /// Load from environment, keeping defaults for unset or unparsable values
    ///
    /// Environment variables:
    /// - OFFLOAD_DEGENERATE_POLICY: proceed | short_circuit
    /// - OFFLOAD_MAX_DESCRIPTOR_BUFFERS: decimal buffer count
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("OFFLOAD_DEGENERATE_POLICY") {
            match raw.parse() {
                Ok(policy) => config.degenerate_policy = policy,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring OFFLOAD_DEGENERATE_POLICY"),
            }
        }

        if let Ok(raw) = std::env::var("OFFLOAD_MAX_DESCRIPTOR_BUFFERS") {
            match raw.trim().parse::<usize>() {
                Ok(max) if max > 0 => config.max_descriptor_buffers = max,
                _ => warn!(value = %raw, "Ignoring OFFLOAD_MAX_DESCRIPTOR_BUFFERS"),
            }
        }

        config
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            degenerate_policy: DegenerateJobPolicy::Proceed,
            max_descriptor_buffers: MAX_DESCRIPTOR_BUFFERS,
            contiguous_map_pages: CONTIGUOUS_MAP_MAX_PAGES,
            config_line_capacity: CONFIG_LINE_CAPACITY,
        }
    }
}
