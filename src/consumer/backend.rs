/*!
 * Syndrome Backends
 *
 * Arithmetic run by the consumer on mapped buffers. The last two buffers
 * of a job are the redundancy buffers (P then Q) and are written in place.
 */

use crate::core::errors::{OffloadError, OffloadResult};
use crate::core::limits::{DONE_MARKER, MIN_SYNDROME_BUFFERS, PAGE_SIZE};
use crate::core::types::Size;
use crate::ipc::BufferView;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Computes redundancy for one job in place
#[cfg_attr(test, mockall::automock)]
pub trait SyndromeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// `buffers` holds `buffer_count` views of at least `buffer_length`
    /// bytes each; the last two are overwritten with P and Q
    fn gen_syndrome(
        &self,
        buffer_count: usize,
        buffer_length: Size,
        buffers: &[BufferView],
    ) -> OffloadResult<()>;
}

/// Backend selectable by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Raid6,
    Marker,
}

impl BackendKind {
    pub fn build(self) -> Arc<dyn SyndromeBackend> {
        match self {
            BackendKind::Raid6 => Arc::new(Raid6Syndrome::new()),
            BackendKind::Marker => Arc::new(MarkerBackend::new()),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Raid6 => f.write_str("raid6"),
            BackendKind::Marker => f.write_str("marker"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raid6" | "vanilla" => Ok(BackendKind::Raid6),
            "marker" => Ok(BackendKind::Marker),
            other => Err(format!("unknown syndrome backend '{}'", other)),
        }
    }
}

fn check_views(buffer_count: usize, buffer_length: Size, buffers: &[BufferView]) -> OffloadResult<()> {
    if buffers.len() < buffer_count {
        return Err(OffloadError::ProtocolViolation(format!(
            "{} buffers mapped for a job of {}",
            buffers.len(),
            buffer_count
        )));
    }
    match buffers[..buffer_count].iter().find(|view| view.len() < buffer_length) {
        Some(short) => Err(OffloadError::InvalidRange {
            offset: 0,
            size: buffer_length,
            length: short.len(),
        }),
        None => Ok(()),
    }
}

/// Multiply by the generator {02} in GF(2^8) with polynomial 0x11d
#[inline(always)]
pub fn gf_mul2(x: u8) -> u8 {
    (x << 1) ^ if x & 0x80 != 0 { 0x1d } else { 0 }
}

/// Reference RAID-6 syndrome: P = XOR of data, Q = Reed-Solomon over
/// GF(2^8). Data buffers are folded from the highest index down, so
/// Q = sum(g^z * D_z).
#[derive(Debug, Clone, Copy, Default)]
pub struct Raid6Syndrome;

impl Raid6Syndrome {
    pub fn new() -> Self {
        Self
    }
}

impl SyndromeBackend for Raid6Syndrome {
    fn name(&self) -> &'static str {
        "raid6"
    }

    fn gen_syndrome(
        &self,
        buffer_count: usize,
        buffer_length: Size,
        buffers: &[BufferView],
    ) -> OffloadResult<()> {
        if buffer_count < MIN_SYNDROME_BUFFERS {
            return Err(OffloadError::ProtocolViolation(format!(
                "syndrome needs at least {} buffers, got {}",
                MIN_SYNDROME_BUFFERS, buffer_count
            )));
        }
        check_views(buffer_count, buffer_length, buffers)?;

        let (data, parity) = buffers[..buffer_count].split_at(buffer_count - 2);
        let z0 = data.len() - 1;

        let chunk = PAGE_SIZE.min(buffer_length.max(1));
        let mut wp = vec![0u8; chunk];
        let mut wq = vec![0u8; chunk];
        let mut wd = vec![0u8; chunk];

        let mut offset = 0;
        while offset < buffer_length {
            let n = chunk.min(buffer_length - offset);
            let (p, q, d) = (&mut wp[..n], &mut wq[..n], &mut wd[..n]);

            data[z0].read_at(offset, p)?;
            q.copy_from_slice(p);
            for view in data[..z0].iter().rev() {
                view.read_at(offset, d)?;
                for ((p, q), d) in p.iter_mut().zip(q.iter_mut()).zip(d.iter()) {
                    *p ^= d;
                    *q = gf_mul2(*q) ^ d;
                }
            }

            parity[0].write_at(offset, p)?;
            parity[1].write_at(offset, q)?;
            offset += n;
        }
        Ok(())
    }
}

/// Writes `"done"` at the start of the last buffer; used by demos and
/// tests to observe that the consumer touched the job
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerBackend;

impl MarkerBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SyndromeBackend for MarkerBackend {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn gen_syndrome(
        &self,
        buffer_count: usize,
        buffer_length: Size,
        buffers: &[BufferView],
    ) -> OffloadResult<()> {
        if buffer_count == 0 {
            return Ok(());
        }
        check_views(buffer_count, buffer_length, buffers)?;
        buffers[buffer_count - 1].write_at(0, DONE_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gf_mul2() {
        assert_eq!(gf_mul2(0x01), 0x02);
        assert_eq!(gf_mul2(0x40), 0x80);
        assert_eq!(gf_mul2(0x80), 0x1d);
        assert_eq!(gf_mul2(0xff), 0xe3);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("RAID6".parse(), Ok(BackendKind::Raid6));
        assert_eq!("marker".parse(), Ok(BackendKind::Marker));
        assert!("gpu".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Marker.build().name(), "marker");
    }

    #[test]
    fn test_raid6_rejects_small_jobs() {
        let err = Raid6Syndrome::new().gen_syndrome(2, 16, &[]).unwrap_err();
        assert!(matches!(err, OffloadError::ProtocolViolation(_)));
    }

    #[test]
    fn test_marker_degenerate_is_noop() {
        assert!(MarkerBackend::new().gen_syndrome(0, 4096, &[]).is_ok());
    }
}
