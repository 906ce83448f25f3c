/*!
 * End-to-End Offload Tests
 * Producer and consumer daemon on every transport
 */

mod common;

use pretty_assertions::assert_eq;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use syndrome_offload::{
    Backing, BackendKind, ChannelConfig, ConsumerDaemon, DaemonConfig, DegenerateJobPolicy,
    OffloadChannel, OffloadError, TransportKind,
};

struct RunningDaemon {
    shutdown: Arc<AtomicBool>,
    handle: thread::JoinHandle<Result<u64, OffloadError>>,
}

impl RunningDaemon {
    fn stop(self, channel: &OffloadChannel) -> u64 {
        self.shutdown.store(true, Ordering::Release);
        channel.stop();
        self.handle.join().unwrap().unwrap()
    }
}

fn spawn_daemon(channel: &OffloadChannel, config: DaemonConfig) -> RunningDaemon {
    let daemon = ConsumerDaemon::from_config(channel, &config);
    daemon.register().unwrap();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handle = {
        let shutdown = shutdown.clone();
        thread::spawn(move || daemon.run(&shutdown))
    };

    // A datagram consumer is unreachable until its endpoint is bound
    if config.transport == TransportKind::Datagram {
        while !channel.transports().datagram.is_bound(config.identity) {
            thread::sleep(Duration::from_millis(1));
        }
    }
    RunningDaemon { shutdown, handle }
}

#[test]
fn test_marker_job_over_queue() {
    let channel = OffloadChannel::start(ChannelConfig::default());
    let daemon = spawn_daemon(
        &channel,
        DaemonConfig::new(42, TransportKind::Queue).with_backend(BackendKind::Marker),
    );

    let bufs = common::buffers(5, 4096, Backing::Paged);
    channel.submit(5, 4096, &bufs).unwrap();

    assert_eq!(&bufs[4].to_vec()[..4], b"done");
    assert!(bufs[..4].iter().all(|b| b.to_vec().iter().all(|&x| x == 0)));
    assert_eq!(channel.state(), 'n');
    assert_eq!(daemon.stop(&channel), 1);
}

#[test]
fn test_consumer_sees_producer_addresses() {
    let channel = common::configured_channel(42, TransportKind::Queue, ChannelConfig::default());
    let port = channel.consumer_port(42);
    let bufs = common::buffers(5, 4096, Backing::Paged);
    let addresses: Vec<_> = bufs.iter().map(|b| b.address()).collect();

    let consumer = thread::spawn(move || {
        let token = port.read_job().unwrap();
        let view = port.map_descriptor().unwrap();
        let mapped: Vec<_> = (0..view.buffer_count)
            .map(|i| port.map_buffer(i).unwrap().address())
            .collect();
        port.signal_done(&token.to_ne_bytes()).unwrap();
        (token, view, mapped)
    });

    channel.submit(5, 4096, &bufs).unwrap();
    let (token, view, mapped) = consumer.join().unwrap();
    assert_eq!(view.token, token);
    assert_eq!(view.buffer_addresses, addresses);
    assert_eq!(mapped, addresses);
}

#[test]
fn test_degenerate_job_completes_by_default() {
    let channel = OffloadChannel::start(ChannelConfig::default());
    let daemon = spawn_daemon(
        &channel,
        DaemonConfig::new(42, TransportKind::Queue).with_backend(BackendKind::Marker),
    );

    // Five requested, three supplied: packed as degenerate
    let bufs = common::buffers(3, 4096, Backing::Paged);
    assert_eq!(channel.submit(5, 4096, &bufs), Ok(()));
    assert!(bufs.iter().all(|b| b.to_vec().iter().all(|&x| x == 0)));

    let stats = channel.stats();
    assert_eq!(stats.degenerate_jobs, 1);
    assert_eq!(stats.jobs_completed, 1);
    daemon.stop(&channel);
}

#[test]
fn test_degenerate_job_short_circuits_when_strict() {
    let config = ChannelConfig::default().with_degenerate_policy(DegenerateJobPolicy::ShortCircuit);
    let channel = common::configured_channel(42, TransportKind::Queue, config);
    let bufs = common::buffers(3, 4096, Backing::Paged);

    assert_eq!(
        channel.submit(5, 4096, &bufs),
        Err(OffloadError::AllocationFailure { requested: 5 })
    );
    assert_eq!(channel.state(), 'n');
    let stats = channel.stats();
    assert_eq!(stats.degenerate_jobs, 1);
    assert_eq!(stats.jobs_failed, 1);
}

#[test]
fn test_raid6_on_every_transport() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);

    for transport in TransportKind::ALL {
        let channel = OffloadChannel::start(ChannelConfig::default());
        let daemon = spawn_daemon(&channel, DaemonConfig::new(42, transport));

        for disks in [3usize, 6, 10] {
            let length = 3 * 4096 + 17;
            let backing = if disks % 2 == 0 {
                Backing::Contiguous
            } else {
                Backing::Paged
            };
            let bufs = common::buffers(disks, length, backing);

            let data: Vec<Vec<u8>> = bufs[..disks - 2]
                .iter()
                .map(|buf| {
                    let bytes: Vec<u8> = (0..length).map(|_| rng.gen()).collect();
                    buf.write_at(0, &bytes).unwrap();
                    bytes
                })
                .collect();

            channel.submit(disks, length, &bufs).unwrap();

            let (p, q) = common::reference_pq(&data);
            assert_eq!(bufs[disks - 2].to_vec(), p, "P on {} with {} disks", transport, disks);
            assert_eq!(bufs[disks - 1].to_vec(), q, "Q on {} with {} disks", transport, disks);
        }

        assert_eq!(channel.stats().jobs_completed, 3);
        assert_eq!(daemon.stop(&channel), 3, "jobs served on {}", transport);
    }
}

#[test]
fn test_stop_unblocks_pending_submission() {
    let channel = OffloadChannel::start(ChannelConfig::default());
    let bufs = common::buffers(3, 64, Backing::Paged);

    let producer = {
        let channel = channel.clone();
        let bufs = bufs.clone();
        thread::spawn(move || channel.submit(3, 64, &bufs))
    };
    thread::sleep(Duration::from_millis(50));
    channel.stop();

    assert!(matches!(
        producer.join().unwrap(),
        Err(OffloadError::Interrupted(_))
    ));
    assert!(matches!(
        channel.submit(3, 64, &bufs),
        Err(OffloadError::Interrupted(_))
    ));
    assert!(channel.is_stopped());
}
