/*!
 * Consumer Daemon
 *
 * Registers with the configuration gate and serves jobs on the configured
 * transport: obtain job, map descriptor and buffers, run the backend,
 * signal completion.
 *
 * The handshake is always completed, even when processing fails, so a
 * bad job never leaves the producer blocked. The processing error is
 * returned to the daemon's caller instead.
 */

use super::backend::SyndromeBackend;
use super::config::DaemonConfig;
use crate::channel::{ConsumerPort, GateOutcome, OffloadChannel};
use crate::core::errors::{OffloadError, OffloadResult};
use crate::core::types::TransportKind;
use crate::ipc::{ControlPayload, DatagramEndpoint, DescriptorView};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct ConsumerDaemon {
    port: ConsumerPort,
    backend: Arc<dyn SyndromeBackend>,
    transport: TransportKind,
}

impl ConsumerDaemon {
    pub fn new(port: ConsumerPort, backend: Arc<dyn SyndromeBackend>, transport: TransportKind) -> Self {
        Self {
            port,
            backend,
            transport,
        }
    }

    pub fn from_config(channel: &OffloadChannel, config: &DaemonConfig) -> Self {
        Self::new(
            channel.consumer_port(config.identity),
            config.backend.build(),
            config.transport,
        )
    }

    pub fn port(&self) -> &ConsumerPort {
        &self.port
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Write identity and transport into the gate
    ///
    /// Succeeds if the channel ends up configured for this daemon, including
    /// when it already was.
    pub fn register(&self) -> OffloadResult<()> {
        let me = self.port.identity();
        match self.port.register(self.transport) {
            Ok(GateOutcome::Configured { identity, transport })
                if identity == me && transport == self.transport =>
            {
                info!(identity, %transport, backend = self.backend.name(), "Consumer registered");
                Ok(())
            }
            Ok(GateOutcome::Configured { identity, .. }) => Err(OffloadError::IdentityMismatch {
                expected: identity,
                actual: me,
            }),
            Ok(other) => Err(OffloadError::ProtocolViolation(format!(
                "registration ended with {:?}",
                other
            ))),
            Err(OffloadError::AlreadyConfigured { identity, transport })
                if identity == me && transport == self.transport =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Prepare the transport-specific side of the consumer
    pub fn open_session(&self) -> OffloadResult<ConsumerSession<'_>> {
        let link = match self.transport {
            TransportKind::Queue => SessionLink::Queue,
            TransportKind::Control => SessionLink::Control(ControlPayload::marker()),
            TransportKind::Datagram => SessionLink::Datagram(self.port.bind_datagram()?),
        };
        Ok(ConsumerSession { daemon: self, link })
    }

    /// Map the live job and run the backend on it
    pub fn process(&self) -> OffloadResult<DescriptorView> {
        let job = self.port.map_descriptor()?;
        if job.is_degenerate() {
            warn!(seq = job.seq, "Degenerate job, nothing to compute");
            return Ok(job);
        }

        let views = (0..job.buffer_count)
            .map(|index| self.port.map_buffer(index))
            .collect::<OffloadResult<Vec<_>>>()?;
        self.backend
            .gen_syndrome(job.buffer_count, job.buffer_length, &views)?;

        debug!(
            seq = job.seq,
            buffers = job.buffer_count,
            length = job.buffer_length,
            backend = self.backend.name(),
            "Syndrome computed"
        );
        Ok(job)
    }

    /// Serve jobs until `shutdown` is set or the channel stops
    ///
    /// Returns the number of jobs served successfully.
    pub fn run(&self, shutdown: &AtomicBool) -> OffloadResult<u64> {
        let mut session = self.open_session()?;
        let mut served = 0u64;
        info!(identity = self.port.identity(), transport = %self.transport, "Consumer daemon serving");

        while !shutdown.load(Ordering::Acquire) && !self.port.is_stopped() {
            match session.serve_one() {
                Ok(_) => served += 1,
                Err(OffloadError::Interrupted(reason)) => {
                    if shutdown.load(Ordering::Acquire) || self.port.is_stopped() {
                        break;
                    }
                    debug!(reason = %reason, "Consumer wait interrupted, resuming");
                }
                Err(err) => error!(error = %err, "Job processing failed"),
            }
        }

        info!(served, "Consumer daemon exiting");
        Ok(served)
    }
}

impl std::fmt::Debug for ConsumerDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerDaemon")
            .field("identity", &self.port.identity())
            .field("transport", &self.transport)
            .field("backend", &self.backend.name())
            .finish()
    }
}

enum SessionLink {
    Queue,
    Control(ControlPayload),
    Datagram(DatagramEndpoint),
}

/// Transport-bound serving loop of one daemon
pub struct ConsumerSession<'a> {
    daemon: &'a ConsumerDaemon,
    link: SessionLink,
}

impl ConsumerSession<'_> {
    /// Wait for the next job, compute it and complete the handshake
    ///
    /// On the control transport completion is signalled by the next
    /// control call, i.e. by the following `serve_one`.
    pub fn serve_one(&mut self) -> OffloadResult<DescriptorView> {
        let port = &self.daemon.port;
        match &mut self.link {
            SessionLink::Queue => {
                let token = port.read_job_bytes()?;
                let processed = self.daemon.process();
                port.signal_done(&token)?;
                processed
            }
            SessionLink::Control(payload) => {
                port.control(payload)?;
                self.daemon.process()
            }
            SessionLink::Datagram(endpoint) => {
                let job = endpoint.recv()?;
                let processed = self.daemon.process();
                endpoint.reply(job.token)?;
                processed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::backend::MockSyndromeBackend;
    use crate::core::config::ChannelConfig;
    use crate::ipc::{Backing, BufferArena};
    use std::thread;

    #[test]
    fn test_backend_sees_whole_job() {
        let channel = OffloadChannel::start(ChannelConfig::default());
        let mut backend = MockSyndromeBackend::new();
        backend.expect_name().return_const("mock");
        backend
            .expect_gen_syndrome()
            .withf(|count, length, views| {
                *count == 4 && *length == 512 && views.len() == 4 && views[3].index() == 3
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let daemon = ConsumerDaemon::new(
            channel.consumer_port(42),
            Arc::new(backend),
            TransportKind::Queue,
        );
        daemon.register().unwrap();

        let bufs = BufferArena::new().allocate_set(4, 512, Backing::Paged).unwrap();
        let producer = {
            let channel = channel.clone();
            thread::spawn(move || channel.submit(4, 512, &bufs))
        };

        let mut session = daemon.open_session().unwrap();
        let job = session.serve_one().unwrap();
        assert_eq!(job.buffer_count, 4);
        assert_eq!(producer.join().unwrap(), Ok(()));
    }

    #[test]
    fn test_register_is_idempotent_for_same_daemon() {
        let channel = OffloadChannel::start(ChannelConfig::default());
        let daemon = ConsumerDaemon::from_config(
            &channel,
            &DaemonConfig::new(42, TransportKind::Datagram),
        );
        daemon.register().unwrap();
        daemon.register().unwrap();

        let other = ConsumerDaemon::from_config(&channel, &DaemonConfig::new(7, TransportKind::Datagram));
        assert!(matches!(
            other.register(),
            Err(OffloadError::AlreadyConfigured { identity: 42, .. })
        ));
    }
}
