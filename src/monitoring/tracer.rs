/*!
 * Job Tracing
 * Structured tracing for offload round trips using the tracing crate
 *
 * Features:
 * - Trace ID per job for correlating producer and consumer logs
 * - JSON-formatted logs for structured parsing
 * - Round-trip latency recorded on the job span
 */

use crate::core::types::{JobSeq, TransportKind};
use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Round trips slower than this are logged at warn level
const SLOW_JOB_THRESHOLD: Duration = Duration::from_millis(100);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - OFFLOAD_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("OFFLOAD_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
    installed
}

/// Generate a unique trace ID for job correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one submission from lock acquisition to release
pub struct JobSpan {
    span: tracing::Span,
    start: Instant,
    trace_id: String,
    seq: JobSeq,
}

impl JobSpan {
    pub fn new(seq: JobSeq, transport: TransportKind) -> Self {
        let trace_id = generate_trace_id();
        let span = span!(
            Level::DEBUG,
            "offload_job",
            trace_id = %trace_id,
            seq = seq,
            transport = %transport,
            buffers = tracing::field::Empty,
            result = tracing::field::Empty,
            error = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            trace_id,
            seq,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn record_buffers(&self, count: usize) {
        self.span.record("buffers", count);
    }

    pub fn record_success(&self) {
        self.span.record("result", "success");
    }

    pub fn record_error(&self, error: &str) {
        self.span.record("error", error);
        self.span.record("result", "error");
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for JobSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);
        let _entered = self.span.enter();

        if duration > SLOW_JOB_THRESHOLD {
            warn!(
                trace_id = %self.trace_id,
                seq = self.seq,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow offload round trip"
            );
        } else {
            debug!(
                seq = self.seq,
                duration_us = duration.as_micros() as u64,
                "offload round trip finished"
            );
        }
    }
}

/// Open the span for job `seq` on `transport`
pub fn span_job(seq: JobSeq, transport: TransportKind) -> JobSpan {
    JobSpan::new(seq, transport)
}
