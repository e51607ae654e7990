//! Flowkube - Health
//!
//! Health status reporting and service metrics.
//!
//! # Overview
//!
//! The [`Reporter`] tracks the service status machine
//! (`Starting → Ready`, any state `→ Error`) and the record counters.
//! [`serve`](server::serve) exposes them over HTTP:
//!
//! - `GET /health/live` - 200 unless the status is `Error`
//! - `GET /health/ready` (also `/health`) - 200 only when `Ready`
//! - `GET /metrics` - Prometheus text format
//!
//! Health bodies follow the Microprofile Health 2.1 representation
//! (`{status, checks: [...]}`).

mod metrics;
mod server;

pub use metrics::Metrics;
pub use server::{serve, ServerError};

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Service status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// The service is starting and not yet ready to process flows
    Starting = 0,
    /// The service is healthy and processing flows
    Ready = 1,
    /// The service hit a fatal condition
    Error = 2,
}

impl Status {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Status::Ready,
            2 => Status::Error,
            _ => Status::Starting,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Starting => "STARTING",
            Status::Ready => "READY",
            Status::Error => "ERROR",
        }
    }
}

/// Reporter of the health status and record statistics of the service
pub struct Reporter {
    status: AtomicU8,
    metrics: Arc<Metrics>,
}

impl Reporter {
    /// Create a reporter in the given initial status.
    ///
    /// The metric families are shared: ingesters increment their decoder
    /// counters on the same `Arc`.
    pub fn new(status: Status, metrics: Arc<Metrics>) -> Self {
        Self {
            status: AtomicU8::new(status as u8),
            metrics,
        }
    }

    /// Current status
    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Relaxed))
    }

    /// Move the status machine
    pub fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Relaxed);
        tracing::debug!(status = status.as_str(), "health status changed");
    }

    /// Annotate a record as successfully processed by the enricher
    pub fn record_enriched(&self) {
        self.metrics.record_enriched.inc();
    }

    /// Annotate a record lost on export, with the error category
    pub fn record_discarded(&self, error: &str) {
        self.metrics.record_discarded.with_label_values(&[error]).inc();
    }

    /// Access the metric families (decoder counters, registry)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
#[path = "health_test.rs"]
mod health_test;
