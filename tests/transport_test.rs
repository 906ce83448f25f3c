/*!
 * Transport Tests
 * Ordering, single-job exclusion and failure paths of each transport
 */

mod common;

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use syndrome_offload::{
    Backing, ChannelConfig, ControlPayload, OffloadChannel, OffloadError, TransportKind,
};

/// Interrupt the channel once a waiter is actually blocked
fn interrupt_blocked(channel: &OffloadChannel) {
    while channel.interrupt() == 0 {
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_queue_jobs_are_totally_ordered() {
    const PRODUCERS: usize = 4;
    const JOBS_EACH: usize = 5;

    let channel = common::configured_channel(42, TransportKind::Queue, ChannelConfig::default());
    let port = channel.consumer_port(42);

    let consumer = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..PRODUCERS * JOBS_EACH {
            let token = port.read_job_bytes().unwrap();
            assert_eq!(port.job_state(), 'u');
            seen.push(port.map_descriptor().unwrap().seq);
            port.signal_done(&token).unwrap();
        }
        seen
    });

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let channel = channel.clone();
            thread::spawn(move || {
                let bufs = common::buffers(3, 64, Backing::Paged);
                for _ in 0..JOBS_EACH {
                    channel.submit(3, 64, &bufs).unwrap();
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let seen = consumer.join().unwrap();

    let expected: Vec<u64> = (1..=(PRODUCERS * JOBS_EACH) as u64).collect();
    assert_eq!(seen, expected);
    assert_eq!(channel.stats().jobs_completed, (PRODUCERS * JOBS_EACH) as u64);
    assert_eq!(channel.state(), 'n');
}

#[test]
fn test_second_submission_waits_for_first() {
    let channel = common::configured_channel(42, TransportKind::Queue, ChannelConfig::default());
    let port = channel.consumer_port(42);

    let first = {
        let channel = channel.clone();
        thread::spawn(move || channel.submit(3, 64, &common::buffers(3, 64, Backing::Paged)))
    };
    let token = port.read_job_bytes().unwrap();

    let second = {
        let channel = channel.clone();
        thread::spawn(move || channel.submit(3, 64, &common::buffers(3, 64, Backing::Paged)))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!second.is_finished());
    assert_eq!(channel.stats().jobs_submitted, 1);
    assert_eq!(channel.state(), 'u');

    port.signal_done(&token).unwrap();
    assert_eq!(first.join().unwrap(), Ok(()));

    let token = port.read_job_bytes().unwrap();
    assert_eq!(port.map_descriptor().unwrap().seq, 2);
    port.signal_done(&token).unwrap();
    assert_eq!(second.join().unwrap(), Ok(()));
}

#[test]
fn test_queue_wrong_token_fails_job() {
    let channel = common::configured_channel(42, TransportKind::Queue, ChannelConfig::default());
    let port = channel.consumer_port(42);

    let producer = {
        let channel = channel.clone();
        thread::spawn(move || channel.submit(3, 64, &common::buffers(3, 64, Backing::Paged)))
    };

    let token = port.read_job().unwrap();
    let bogus = (token.value() ^ 0xff).to_ne_bytes();
    let err = port.signal_done(&bogus).unwrap_err();
    assert!(matches!(err, OffloadError::AddressMismatch { .. }));

    assert_eq!(producer.join().unwrap(), Err(err));
    assert_eq!(channel.stats().jobs_failed, 1);
    assert_eq!(channel.state(), 'n');
}

#[test]
fn test_control_bad_acknowledgement() {
    let channel = common::configured_channel(42, TransportKind::Control, ChannelConfig::default());
    let port = channel.consumer_port(42);

    let consumer = thread::spawn(move || {
        let mut payload = ControlPayload::marker();
        port.control(&mut payload).unwrap();

        // Acknowledge job 1 with garbage; the call then picks up job 2
        let mut junk = ControlPayload::from_bytes(*b"junk\0");
        port.control(&mut junk).unwrap();
        assert!(junk.is_marker());
        let seq = port.map_descriptor().unwrap().seq;

        port.control(&mut payload).unwrap();
        seq
    });

    let bufs = common::buffers(3, 64, Backing::Paged);
    assert!(matches!(
        channel.submit(3, 64, &bufs),
        Err(OffloadError::ProtocolViolation(_))
    ));
    assert_eq!(channel.submit(3, 64, &bufs), Ok(()));

    // Job 3 releases the consumer's last call
    let producer = {
        let channel = channel.clone();
        thread::spawn(move || channel.submit(3, 64, &common::buffers(3, 64, Backing::Paged)))
    };
    assert_eq!(consumer.join().unwrap(), 2);

    interrupt_blocked(&channel);
    assert!(matches!(
        producer.join().unwrap(),
        Err(OffloadError::Interrupted(_))
    ));
    let stats = channel.stats();
    assert_eq!(stats.jobs_completed, 1);
    assert_eq!(stats.jobs_failed, 2);
}

#[test]
fn test_datagram_reply_from_wrong_identity() {
    let channel =
        common::configured_channel(42, TransportKind::Datagram, ChannelConfig::default());
    let endpoint = channel.consumer_port(42).bind_datagram().unwrap();
    let rogue = channel.consumer_port(7).bind_datagram().unwrap();

    let bufs = common::buffers(3, 64, Backing::Paged);
    for buf in &bufs {
        buf.fill(0x5a);
    }

    let consumer = thread::spawn(move || {
        let job = endpoint.recv().unwrap();
        rogue.reply(job.token).unwrap();
        job
    });

    assert_eq!(
        channel.submit(3, 64, &bufs),
        Err(OffloadError::IdentityMismatch {
            expected: 42,
            actual: 7
        })
    );
    assert_eq!(consumer.join().unwrap().sender, 0);
    for buf in &bufs {
        assert!(buf.to_vec().iter().all(|&b| b == 0x5a));
    }
}

#[test]
fn test_datagram_unbound_consumer_unreachable() {
    let channel =
        common::configured_channel(42, TransportKind::Datagram, ChannelConfig::default());
    let bufs = common::buffers(3, 64, Backing::Paged);

    assert_eq!(
        channel.submit(3, 64, &bufs),
        Err(OffloadError::Unreachable(42))
    );
    assert_eq!(channel.state(), 'n');
    assert_eq!(channel.stats().descriptors_leaked, 0);

    // Binding afterwards makes the consumer reachable
    let endpoint = channel.consumer_port(42).bind_datagram().unwrap();
    let consumer = thread::spawn(move || {
        let job = endpoint.recv().unwrap();
        endpoint.reply(job.token).unwrap();
    });
    assert_eq!(channel.submit(3, 64, &bufs), Ok(()));
    consumer.join().unwrap();
}

#[test]
fn test_interrupted_job_retires_descriptor() {
    let channel = Arc::new(common::configured_channel(
        42,
        TransportKind::Queue,
        ChannelConfig::default(),
    ));
    let bufs = common::buffers(3, 64, Backing::Paged);

    let producer = {
        let channel = channel.clone();
        let bufs = bufs.clone();
        thread::spawn(move || channel.submit(3, 64, &bufs))
    };
    interrupt_blocked(&channel);

    assert!(matches!(
        producer.join().unwrap(),
        Err(OffloadError::Interrupted(_))
    ));
    let stats = channel.stats();
    assert_eq!(stats.descriptors_leaked, 1);
    assert_eq!(stats.jobs_failed, 1);
    assert_eq!(channel.state(), 'n');

    // The channel keeps serving after an interrupted job
    let port = channel.consumer_port(42);
    let consumer = thread::spawn(move || {
        let token = port.read_job_bytes().unwrap();
        let seq = port.map_descriptor().unwrap().seq;
        port.signal_done(&token).unwrap();
        seq
    });
    assert_eq!(channel.submit(3, 64, &bufs), Ok(()));
    assert_eq!(consumer.join().unwrap(), 2);
}

#[test]
fn test_queue_late_completion_fails_next_job() {
    let channel = common::configured_channel(42, TransportKind::Queue, ChannelConfig::default());
    let port = channel.consumer_port(42);
    let bufs = common::buffers(3, 64, Backing::Paged);

    let first = {
        let channel = channel.clone();
        let bufs = bufs.clone();
        thread::spawn(move || channel.submit(3, 64, &bufs))
    };
    let stale = port.read_job_bytes().unwrap();
    interrupt_blocked(&channel);
    assert!(matches!(
        first.join().unwrap(),
        Err(OffloadError::Interrupted(_))
    ));

    let second = {
        let channel = channel.clone();
        thread::spawn(move || channel.submit(3, 64, &bufs))
    };
    while !channel.transports().queue.job_ready() {
        thread::sleep(Duration::from_millis(1));
    }

    // Completion for the abandoned job arrives while job 2 is published
    let err = port.signal_done(&stale).unwrap_err();
    assert!(matches!(err, OffloadError::AddressMismatch { .. }));
    assert_eq!(second.join().unwrap(), Err(err));

    let stats = channel.stats();
    assert_eq!(stats.jobs_completed, 0);
    assert_eq!(stats.descriptors_leaked, 1);
}

#[test]
fn test_control_consumer_interrupt_withdraws_arrival() {
    let channel = common::configured_channel(42, TransportKind::Control, ChannelConfig::default());
    let port = channel.consumer_port(42);

    let waiting = {
        let port = port.clone();
        thread::spawn(move || port.control(&mut ControlPayload::marker()))
    };
    interrupt_blocked(&channel);
    assert!(matches!(
        waiting.join().unwrap(),
        Err(OffloadError::Interrupted(_))
    ));
    assert_eq!(channel.transports().control.pending_arrivals(), 0);

    let producer = {
        let channel = channel.clone();
        thread::spawn(move || channel.submit(3, 64, &common::buffers(3, 64, Backing::Paged)))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!producer.is_finished());

    // The next call receives the job; the producer waits for its acknowledgement
    let consumer = thread::spawn(move || {
        let mut payload = ControlPayload::marker();
        port.control(&mut payload).unwrap();
        let seq = port.map_descriptor().unwrap().seq;
        thread::sleep(Duration::from_millis(50));
        (seq, port)
    });
    let (seq, port) = consumer.join().unwrap();
    assert_eq!(seq, 1);
    assert!(!producer.is_finished());

    let acknowledging = thread::spawn(move || port.control(&mut ControlPayload::marker()));
    assert_eq!(producer.join().unwrap(), Ok(()));
    channel.stop();
    assert!(acknowledging.join().unwrap().is_err());
}

#[test]
fn test_datagram_stale_reply_fails_next_job() {
    let channel =
        common::configured_channel(42, TransportKind::Datagram, ChannelConfig::default());
    let endpoint = channel.consumer_port(42).bind_datagram().unwrap();
    let bufs = common::buffers(3, 64, Backing::Paged);

    let first = {
        let channel = channel.clone();
        let bufs = bufs.clone();
        thread::spawn(move || channel.submit(3, 64, &bufs))
    };
    let stale = endpoint.recv().unwrap();
    interrupt_blocked(&channel);
    assert!(matches!(
        first.join().unwrap(),
        Err(OffloadError::Interrupted(_))
    ));

    let second = {
        let channel = channel.clone();
        thread::spawn(move || channel.submit(3, 64, &bufs))
    };
    let fresh = endpoint.recv().unwrap();
    assert_ne!(fresh.token, stale.token);

    endpoint.reply(stale.token).unwrap();
    assert_eq!(
        second.join().unwrap(),
        Err(OffloadError::AddressMismatch {
            expected: fresh.token.value(),
            actual: stale.token.value()
        })
    );
}
