/*!
 * Message-Queue Transport
 *
 * Two endpoints: the consumer reads the job token from the job endpoint
 * and writes it back to the signal endpoint when the job is done.
 *
 * States: Idle -> JobReady -> InFlight -> Done -> Idle. The producer
 * publishes JobReady and blocks until Done; the consumer's read blocks
 * until JobReady.
 */

use super::{JobTicket, Transport};
use crate::core::errors::{OffloadError, OffloadResult};
use crate::core::sync::Handshake;
use crate::core::types::{CorrelationToken, TransportKind};
use parking_lot::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum QueueState {
    Idle,
    JobReady(CorrelationToken),
    InFlight(CorrelationToken),
    Done(Result<(), OffloadError>),
}

/// Queue transport endpoints
#[derive(Debug)]
pub struct QueueTransport {
    state: Handshake<QueueState>,
    producer: Mutex<()>,
    readers: Mutex<()>,
    writers: Mutex<()>,
}

impl QueueTransport {
    pub fn new() -> Self {
        Self {
            state: Handshake::new("queue", QueueState::Idle),
            producer: Mutex::new(()),
            readers: Mutex::new(()),
            writers: Mutex::new(()),
        }
    }

    /// Consumer: block until a job is published and return its token as
    /// native-endian word bytes
    pub fn read_job(&self) -> OffloadResult<[u8; CorrelationToken::WIDTH]> {
        let _reader = self.readers.lock();
        let token = self.state.transition(
            |s| matches!(s, QueueState::JobReady(_)),
            |s| match *s {
                QueueState::JobReady(token) => {
                    *s = QueueState::InFlight(token);
                    Some(token)
                }
                _ => None,
            },
        )?;
        let token = token.ok_or_else(|| {
            OffloadError::ProtocolViolation("job endpoint woke without a job".into())
        })?;
        debug!(token = %token, "Consumer read job");
        Ok(token.to_ne_bytes())
    }

    /// Consumer: signal completion by writing back the token read for the
    /// current job. Returns the number of bytes consumed.
    ///
    /// A token other than the live one completes the job as failed and is
    /// reported to both sides as `AddressMismatch`.
    pub fn signal_done(&self, bytes: &[u8]) -> OffloadResult<usize> {
        let _writer = self.writers.lock();
        let actual = CorrelationToken::from_ne_bytes(bytes).ok_or(OffloadError::Overflow {
            length: bytes.len(),
            capacity: CorrelationToken::WIDTH,
        })?;

        self.state.update(|s| match *s {
            QueueState::JobReady(expected) | QueueState::InFlight(expected) => {
                if actual == expected {
                    *s = QueueState::Done(Ok(()));
                    debug!(token = %actual, "Consumer signalled completion");
                    Ok(bytes.len())
                } else {
                    let err = OffloadError::AddressMismatch {
                        expected: expected.value(),
                        actual: actual.value(),
                    };
                    warn!(expected = %expected, actual = %actual, "Completion token mismatch");
                    *s = QueueState::Done(Err(err.clone()));
                    Err(err)
                }
            }
            QueueState::Idle | QueueState::Done(_) => Err(OffloadError::ProtocolViolation(
                "no job awaiting completion".into(),
            )),
        })
    }

    /// True while a published job has not been picked up
    pub fn job_ready(&self) -> bool {
        self.state.with(|s| matches!(s, QueueState::JobReady(_)))
    }
}

impl Default for QueueTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for QueueTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Queue
    }

    fn round_trip(&self, ticket: &JobTicket) -> OffloadResult<()> {
        let _producer = self.producer.lock();
        self.state.set(QueueState::JobReady(ticket.token));
        debug!(seq = ticket.seq, token = %ticket.token, "Published job on queue");

        let finished = self.state.transition(
            |s| matches!(s, QueueState::Done(_)),
            |s| std::mem::replace(s, QueueState::Idle),
        );

        match finished {
            Ok(QueueState::Done(result)) => result,
            Ok(other) => Err(OffloadError::ProtocolViolation(format!(
                "queue finished in state {:?}",
                other
            ))),
            Err(err) => {
                // Abandoned job: a late completion write must not match it
                self.state.set(QueueState::Idle);
                Err(err.into())
            }
        }
    }

    fn interrupt(&self) -> usize {
        self.state.interrupt()
    }

    fn close(&self) {
        self.state.close();
    }
}
