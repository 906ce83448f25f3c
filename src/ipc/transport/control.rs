/*!
 * Control Transport
 *
 * The consumer makes one blocking control call per job. Each call marks
 * the job delivered by its previous call resumed (complete), posts an
 * arrival, blocks until a job is pending and returns with the marker
 * written into its payload. A call that fails while blocked withdraws its
 * arrival and acknowledges nothing.
 *
 * The producer waits for an arrival before publishing, so the very first
 * submission blocks until the consumer has made its first call.
 */

use super::{JobTicket, Transport};
use crate::core::errors::{OffloadError, OffloadResult};
use crate::core::limits::{CONTROL_MARKER, CONTROL_PAYLOAD_LEN};
use crate::core::sync::Handshake;
use crate::core::types::{JobSeq, TransportKind};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// In/out payload of a control call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPayload([u8; CONTROL_PAYLOAD_LEN]);

impl ControlPayload {
    pub const fn marker() -> Self {
        Self(CONTROL_MARKER)
    }

    pub const fn from_bytes(bytes: [u8; CONTROL_PAYLOAD_LEN]) -> Self {
        Self(bytes)
    }

    pub fn is_marker(&self) -> bool {
        self.0 == CONTROL_MARKER
    }

    pub fn as_bytes(&self) -> &[u8; CONTROL_PAYLOAD_LEN] {
        &self.0
    }

    pub fn clear(&mut self) {
        self.0 = [0; CONTROL_PAYLOAD_LEN];
    }
}

impl Default for ControlPayload {
    fn default() -> Self {
        Self::marker()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlPhase {
    Resume,
    JobPending,
}

#[derive(Debug)]
struct ControlState {
    phase: ControlPhase,
    /// Consumer calls currently blocked waiting for a job
    arrivals: usize,
    /// Job published by the producer
    pending: Option<JobSeq>,
    /// Job handed to the consumer by its previous call; only a call made
    /// while this is set acknowledges anything
    delivered: Option<JobSeq>,
    ack: Option<bool>,
}

impl ControlState {
    /// Forget the in-flight job after a failed round trip
    fn reset(&mut self) {
        self.phase = ControlPhase::Resume;
        self.pending = None;
        self.delivered = None;
    }
}

/// Control transport endpoint
#[derive(Debug)]
pub struct ControlTransport {
    state: Handshake<ControlState>,
    producer: Mutex<()>,
    callers: Mutex<()>,
}

impl ControlTransport {
    pub fn new() -> Self {
        Self {
            state: Handshake::new(
                "control",
                ControlState {
                    phase: ControlPhase::Resume,
                    arrivals: 0,
                    pending: None,
                    delivered: None,
                    ack: None,
                },
            ),
            producer: Mutex::new(()),
            callers: Mutex::new(()),
        }
    }

    /// Consumer control call: acknowledge the job delivered by the previous
    /// call, then block until the next job is pending
    pub fn control(&self, payload: &mut ControlPayload) -> OffloadResult<()> {
        let _caller = self.callers.lock();
        let valid = payload.is_marker();

        self.state.update(|s| {
            if let Some(seq) = s.delivered.take() {
                if !valid {
                    warn!(seq, payload = ?payload.as_bytes(), "Control call without marker payload");
                }
                s.phase = ControlPhase::Resume;
                s.ack = Some(valid);
                debug!(seq, "Control call acknowledged job");
            }
            s.arrivals += 1;
        });

        let taken = self.state.transition(
            |s| s.phase == ControlPhase::JobPending && s.delivered.is_none(),
            |s| {
                s.arrivals -= 1;
                s.delivered = s.pending;
                s.delivered
            },
        );

        match taken {
            Ok(seq) => {
                debug!(seq, "Control call took job");
                *payload = ControlPayload::marker();
                Ok(())
            }
            Err(err) => {
                self.state.update(|s| s.arrivals = s.arrivals.saturating_sub(1));
                Err(err.into())
            }
        }
    }

    pub fn pending_arrivals(&self) -> usize {
        self.state.with(|s| s.arrivals)
    }
}

impl Default for ControlTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ControlTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Control
    }

    fn round_trip(&self, ticket: &JobTicket) -> OffloadResult<()> {
        let _producer = self.producer.lock();

        self.state.transition(
            |s| s.arrivals > 0,
            |s| {
                s.phase = ControlPhase::JobPending;
                s.pending = Some(ticket.seq);
                s.delivered = None;
                s.ack = None;
            },
        )?;
        debug!(seq = ticket.seq, "Job pending on control transport");

        let ack = match self
            .state
            .transition(|s| s.phase == ControlPhase::Resume, |s| s.ack.take())
        {
            Ok(ack) => ack,
            Err(err) => {
                self.state.update(ControlState::reset);
                return Err(err.into());
            }
        };
        self.state.update(|s| s.pending = None);

        match ack {
            Some(true) => Ok(()),
            Some(false) => Err(OffloadError::ProtocolViolation(
                "acknowledgement payload does not carry the control marker".into(),
            )),
            None => Err(OffloadError::ProtocolViolation(
                "job resumed without acknowledgement".into(),
            )),
        }
    }

    fn interrupt(&self) -> usize {
        self.state.interrupt()
    }

    fn close(&self) {
        self.state.close();
    }
}
