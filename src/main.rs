/*!
 * Syndrome Offload Daemon - Main Entry Point
 *
 * Boots an offload channel, starts the consumer daemon on a blocking
 * worker and drives a demo workload of syndrome jobs through it until the
 * workload finishes or Ctrl-C is received.
 */

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use syndrome_offload::ipc::BufferArena;
use syndrome_offload::{
    init_tracing, Backing, ChannelConfig, ConsumerDaemon, DaemonConfig, OffloadChannel,
};
use tracing::{error, info, warn};

const DEFAULT_DEMO_JOBS: usize = 8;
const DEMO_BUFFERS: usize = 6;
const DEMO_BUFFER_LENGTH: usize = 4096;

fn demo_jobs() -> usize {
    std::env::var("OFFLOAD_DEMO_JOBS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_DEMO_JOBS)
}

/// Submit `jobs` syndrome jobs, refreshing the data buffers each time
fn run_workload(channel: &OffloadChannel, jobs: usize) -> Result<()> {
    let arena = BufferArena::new();
    let buffers = arena
        .allocate_set(DEMO_BUFFERS, DEMO_BUFFER_LENGTH, Backing::Paged)
        .context("allocating demo buffers")?;

    for job in 0..jobs {
        for (disk, buffer) in buffers[..DEMO_BUFFERS - 2].iter().enumerate() {
            buffer.fill((job * 31 + disk * 7) as u8);
        }
        channel
            .submit(DEMO_BUFFERS, DEMO_BUFFER_LENGTH, &buffers)
            .with_context(|| format!("submitting job {}", job))?;

        let parity = buffers[DEMO_BUFFERS - 2].to_vec();
        info!(job, p0 = parity[0], "Job completed");
    }

    info!(stats = ?channel.stats(), arena = ?arena.stats(), "Workload finished");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Syndrome offload daemon starting...");

    let channel = OffloadChannel::start(ChannelConfig::from_env());
    let daemon_config = DaemonConfig::from_env();
    info!(
        identity = daemon_config.identity,
        transport = %daemon_config.transport,
        backend = %daemon_config.backend,
        "Consumer configuration loaded"
    );

    let shutdown = Arc::new(AtomicBool::new(false));

    let consumer = {
        let channel = channel.clone();
        let shutdown = shutdown.clone();
        tokio::task::spawn_blocking(move || {
            let daemon = ConsumerDaemon::from_config(&channel, &daemon_config);
            daemon.register()?;
            daemon.run(&shutdown)
        })
    };

    let workload = {
        let channel = channel.clone();
        let jobs = demo_jobs();
        tokio::task::spawn_blocking(move || run_workload(&channel, jobs))
    };

    tokio::select! {
        result = workload => {
            match result.context("workload task panicked")? {
                Ok(()) => info!("Demo workload complete"),
                Err(e) => error!(error = %e, "Demo workload failed"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            warn!("Ctrl-C received, shutting down");
        }
    }

    shutdown.store(true, Ordering::Release);
    channel.stop();

    match consumer.await.context("consumer task panicked")? {
        Ok(served) => info!(served, "Consumer daemon stopped"),
        Err(e) => error!(error = %e, "Consumer daemon failed"),
    }

    let report = serde_json::to_string(&channel.stats()).context("encoding channel stats")?;
    info!(stats = %report, "Syndrome offload daemon stopped");
    Ok(())
}
