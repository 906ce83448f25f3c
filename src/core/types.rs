/*!
 * Core Types
 * Common types shared by every layer of the offload channel
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Consumer identity (process id of the offload daemon)
pub type ConsumerId = u32;

/// Producer-side address of a buffer or of the descriptor slot
pub type Address = usize;

/// Size type for buffer lengths and counts
pub type Size = usize;

/// Monotonic sequence number of a submitted job
pub type JobSeq = u64;

/// Opaque word exchanged on every transport to correlate a reply with the
/// live descriptor. Its value is the address of the job's allocation in
/// the descriptor slot, unique among jobs that may still be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationToken(usize);

impl CorrelationToken {
    /// Width of the token on the wire (one native word)
    pub const WIDTH: usize = std::mem::size_of::<usize>();

    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    pub const fn value(self) -> usize {
        self.0
    }

    pub fn to_ne_bytes(self) -> [u8; Self::WIDTH] {
        self.0.to_ne_bytes()
    }

    /// Decode the leading word of `bytes`; `None` if fewer than
    /// [`Self::WIDTH`] bytes are present.
    pub fn from_ne_bytes(bytes: &[u8]) -> Option<Self> {
        let word: [u8; Self::WIDTH] = bytes.get(..Self::WIDTH)?.try_into().ok()?;
        Some(Self(usize::from_ne_bytes(word)))
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Transport selected once per channel lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Read/write message queue ("procfs" in legacy configuration)
    Queue,
    /// Blocking control call with an in/out payload ("ioctl")
    Control,
    /// Unicast datagrams between identities ("nl")
    Datagram,
}

impl TransportKind {
    pub const ALL: [TransportKind; 3] = [Self::Queue, Self::Control, Self::Datagram];

    /// Canonical configuration token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queue => "QUEUE",
            Self::Control => "CONTROL",
            Self::Datagram => "DATAGRAM",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    /// Accepts canonical and legacy names, case-sensitive like the
    /// configuration protocol.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUE" | "PROCFS" => Ok(Self::Queue),
            "CONTROL" | "IOCTL" => Ok(Self::Control),
            "DATAGRAM" | "NL" => Ok(Self::Datagram),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}
