/*!
 * Tracing
 * Structured logging setup for binaries, tests and benchmarks
 *
 * Library code logs through the `log` facade; the subscriber installed here
 * bridges those records into `tracing` so everything lands in one stream.
 */

use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Environment variable switching output to JSON
pub const ENV_TRACE_JSON: &str = "SUBALLOC_TRACE_JSON";

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - SUBALLOC_TRACE_JSON: Enable JSON output (default: false)
///
/// Calling it more than once is harmless; later calls keep the first subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(ENV_TRACE_JSON)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Timed span around a batch of allocator calls
pub struct WorkloadSpan {
    span: tracing::Span,
    start: Instant,
    name: String,
}

impl WorkloadSpan {
    pub fn new(name: &str) -> Self {
        let span = span!(
            Level::DEBUG,
            "workload",
            workload = name,
            duration_us = tracing::field::Empty,
            allocations = tracing::field::Empty,
            failures = tracing::field::Empty,
        );

        let _entered = span.enter();
        debug!(workload = name, "workload started");
        drop(_entered);

        Self {
            span,
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn record_allocations(&self, count: usize) {
        self.span.record("allocations", count);
    }

    pub fn record_failures(&self, count: usize) {
        self.span.record("failures", count);
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for WorkloadSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration.as_millis() > 100 {
            warn!(
                workload = %self.name,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow workload detected"
            );
        } else {
            debug!(
                workload = %self.name,
                duration_us = duration.as_micros() as u64,
                "workload completed"
            );
        }
    }
}
