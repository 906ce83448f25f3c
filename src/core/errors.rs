/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{ConsumerId, TransportKind};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the channel
pub type OffloadResult<T> = Result<T, OffloadError>;

/// Unified offload error type with miette diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum OffloadError {
    /// Descriptor reference array or buffer frame could not be allocated
    #[error("Allocation failed: {requested} elements requested")]
    #[diagnostic(
        code(offload::allocation_failure),
        help("Reduce the buffer count or buffer length, or free memory.")
    )]
    AllocationFailure { requested: usize },

    /// Consumer echoed a token that is not the live descriptor's
    #[error("Correlation token mismatch: expected {expected:#x}, got {actual:#x}")]
    #[diagnostic(
        code(offload::address_mismatch),
        help("The consumer must echo exactly the token it read for the current job.")
    )]
    AddressMismatch { expected: usize, actual: usize },

    /// Reply arrived from an identity other than the configured consumer
    #[error("Consumer identity mismatch: expected {expected}, got {actual}")]
    #[diagnostic(
        code(offload::identity_mismatch),
        help("Only the consumer registered through the configuration gate may complete jobs.")
    )]
    IdentityMismatch {
        expected: ConsumerId,
        actual: ConsumerId,
    },

    /// Handshake step out of order or malformed acknowledgement
    #[error("Protocol violation: {0}")]
    #[diagnostic(
        code(offload::protocol_violation),
        help("The consumer did not follow the handshake of the configured transport.")
    )]
    ProtocolViolation(String),

    /// Contiguous buffer too large for a single range mapping
    #[error("Mapping of {requested} bytes exceeds contiguous ceiling of {ceiling} bytes")]
    #[diagnostic(
        code(offload::mapping_too_large),
        help("Allocate large buffers with paged backing so they can be mapped page by page.")
    )]
    MappingTooLarge { requested: usize, ceiling: usize },

    /// Mapping offset outside 0..=buffer_count
    #[error("Invalid mapping offset {offset} (valid range 0..={max})")]
    #[diagnostic(
        code(offload::invalid_offset),
        help("Offset 0 maps the descriptor, offset k maps buffer k-1.")
    )]
    InvalidOffset { offset: usize, max: usize },

    /// Input larger (or, for token writes, smaller) than the endpoint accepts
    #[error("Input of {length} bytes does not fit endpoint capacity of {capacity} bytes")]
    #[diagnostic(
        code(offload::overflow),
        help("Configuration lines are limited in length; completion writes must carry one full word.")
    )]
    Overflow { length: usize, capacity: usize },

    /// Identity and transport are already fixed for this channel
    #[error("Channel already configured (identity {identity}, transport {transport})")]
    #[diagnostic(
        code(offload::already_configured),
        help("Identity and transport can be set once per channel lifetime. Restart the channel to change them.")
    )]
    AlreadyConfigured {
        identity: ConsumerId,
        transport: TransportKind,
    },

    /// Configuration line without '='
    #[error("Malformed configuration input: {0:?}")]
    #[diagnostic(
        code(offload::malformed),
        help("Write one key=value pair per line, e.g. identity=42.")
    )]
    Malformed(String),

    /// Configuration value that cannot be parsed
    #[error("Invalid value for '{key}': {value:?}")]
    #[diagnostic(
        code(offload::invalid_value),
        help("identity takes a decimal id; transport takes QUEUE, CONTROL or DATAGRAM.")
    )]
    InvalidValue { key: String, value: String },

    /// Mapping or copy while no descriptor is live
    #[error("No job is currently in flight")]
    #[diagnostic(
        code(offload::no_active_job),
        help("Wait for a job on the configured transport before mapping buffers.")
    )]
    NoActiveJob,

    /// Datagram unicast to an identity with no bound endpoint
    #[error("No consumer endpoint bound for identity {0}")]
    #[diagnostic(
        code(offload::unreachable),
        help("The consumer must bind its datagram endpoint before jobs are submitted.")
    )]
    Unreachable(ConsumerId),

    /// Blocking wait interrupted or channel stopped
    #[error("Wait interrupted: {0}")]
    #[diagnostic(
        code(offload::interrupted),
        help("The in-flight job was abandoned. Its descriptor is not reused.")
    )]
    Interrupted(String),

    /// Copy outside a buffer's bounds
    #[error("Access outside buffer: offset {offset}, size {size}, buffer length {length}")]
    #[diagnostic(code(offload::invalid_range))]
    InvalidRange {
        offset: usize,
        size: usize,
        length: usize,
    },
}

impl OffloadError {
    /// Stable snake_case name used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AllocationFailure { .. } => "allocation_failure",
            Self::AddressMismatch { .. } => "address_mismatch",
            Self::IdentityMismatch { .. } => "identity_mismatch",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::MappingTooLarge { .. } => "mapping_too_large",
            Self::InvalidOffset { .. } => "invalid_offset",
            Self::Overflow { .. } => "overflow",
            Self::AlreadyConfigured { .. } => "already_configured",
            Self::Malformed(_) => "malformed",
            Self::InvalidValue { .. } => "invalid_value",
            Self::NoActiveJob => "no_active_job",
            Self::Unreachable(_) => "unreachable",
            Self::Interrupted(_) => "interrupted",
            Self::InvalidRange { .. } => "invalid_range",
        }
    }
}

impl From<bincode::Error> for OffloadError {
    fn from(err: bincode::Error) -> Self {
        OffloadError::ProtocolViolation(format!("undecodable datagram: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_tagged() {
        let err = OffloadError::IdentityMismatch {
            expected: 42,
            actual: 7,
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"error\":\"identity_mismatch\""));
        let back: OffloadError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_error_kind_matches_serde_tag() {
        let err = OffloadError::InvalidOffset { offset: 9, max: 5 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], err.kind());
    }

    #[test]
    fn test_diagnostic_code() {
        let err = OffloadError::NoActiveJob;
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("offload::no_active_job"));
    }
}
