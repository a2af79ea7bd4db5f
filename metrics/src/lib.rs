// metrics/src/lib.rs
//
// The `Metrics` record referenced throughout the pipeline design: a set of
// atomically-updated counters/gauges passed to every stage, plus a
// Prometheus exporter so an operator can scrape them externally. The `m`
// operator console command reads a `MetricsSnapshot` from this struct
// directly rather than scraping its own exporter.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors installing the Prometheus exporter.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),
}

/// Atomically-updated counters and gauges shared across the distributor,
/// workers, writer, and pause controller.
#[derive(Debug, Default)]
pub struct Metrics {
    blocks_scanned: AtomicU64,
    blocks_failed: AtomicU64,
    transactions_processed: AtomicU64,
    p2pk_addresses_found: AtomicU64,
    write_queue_depth: AtomicU64,
    pause_events: AtomicU64,
    retries_exhausted: AtomicU64,
}

/// A point-in-time read of every counter/gauge in `Metrics`, for the
/// operator console's `m` command and for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub blocks_scanned: u64,
    pub blocks_failed: u64,
    pub transactions_processed: u64,
    pub p2pk_addresses_found: u64,
    pub write_queue_depth: u64,
    pub pause_events: u64,
    pub retries_exhausted: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_block_scanned(&self) {
        self.blocks_scanned.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("p2pk_scanner_blocks_scanned_total").increment(1);
    }

    pub fn record_block_failed(&self) {
        self.blocks_failed.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("p2pk_scanner_blocks_failed_total").increment(1);
    }

    pub fn record_transactions_processed(&self, count: u64) {
        self.transactions_processed.fetch_add(count, Ordering::Relaxed);
        ::metrics::counter!("p2pk_scanner_transactions_processed_total").increment(count);
    }

    pub fn record_p2pk_addresses_found(&self, count: u64) {
        self.p2pk_addresses_found.fetch_add(count, Ordering::Relaxed);
        ::metrics::counter!("p2pk_scanner_p2pk_addresses_found_total").increment(count);
    }

    pub fn set_write_queue_depth(&self, depth: u64) {
        self.write_queue_depth.store(depth, Ordering::Relaxed);
        ::metrics::gauge!("p2pk_scanner_write_queue_depth").set(depth as f64);
    }

    pub fn record_pause_event(&self) {
        self.pause_events.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("p2pk_scanner_pause_events_total").increment(1);
    }

    pub fn record_retry_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("p2pk_scanner_retries_exhausted_total").increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_scanned: self.blocks_scanned.load(Ordering::Relaxed),
            blocks_failed: self.blocks_failed.load(Ordering::Relaxed),
            transactions_processed: self.transactions_processed.load(Ordering::Relaxed),
            p2pk_addresses_found: self.p2pk_addresses_found.load(Ordering::Relaxed),
            write_queue_depth: self.write_queue_depth.load(Ordering::Relaxed),
            pause_events: self.pause_events.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Install a Prometheus exporter serving `/metrics` over HTTP on `addr`.
/// Must be called from within a running Tokio runtime.
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    Ok(())
}
