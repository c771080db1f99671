/*!
 * Tracing
 * Structured tracing for process-lifecycle syscalls using the tracing crate
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, span, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - KERNEL_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("KERNEL_TRACE_JSON")
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
                    .with_span_list(true),
            )
            .try_init()
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
    };

    if installed.is_ok() {
        info!(json = use_json, "Structured tracing initialized");
    }
}

static NEXT_TRACE_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonic id correlating the events of one syscall
pub fn next_trace_id() -> u64 {
    NEXT_TRACE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Span covering one process-lifecycle syscall
pub struct SyscallSpan {
    span: tracing::Span,
    start: Instant,
    syscall_name: &'static str,
    trace_id: u64,
}

impl SyscallSpan {
    pub fn new(syscall_name: &'static str, pid: u32) -> Self {
        let trace_id = next_trace_id();
        let span = span!(
            Level::DEBUG,
            "syscall",
            trace_id,
            syscall = syscall_name,
            pid,
            result = tracing::field::Empty,
            errno = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            syscall_name,
            trace_id,
        }
    }

    pub fn trace_id(&self) -> u64 {
        self.trace_id
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn record_return(&self, value: i32) {
        self.span.record("result", value);
    }

    pub fn record_errno(&self, errno: i32) {
        self.span.record("result", -1);
        self.span.record("errno", errno);
    }
}

impl Drop for SyscallSpan {
    fn drop(&mut self) {
        let _entered = self.span.enter();
        debug!(
            trace_id = self.trace_id,
            syscall = self.syscall_name,
            duration_us = self.start.elapsed().as_micros() as u64,
            "syscall completed"
        );
    }
}
