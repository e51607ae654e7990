//! Loki submitter
//!
//! Turns each record into a `(labels, timestamp, line)` tuple and hands it
//! to the background batcher:
//!
//! 1. The timestamp attribute (configurable) is coerced to float and
//!    rescaled by `timestampScale`; anything missing, non-numeric or zero
//!    falls back to the wall clock with a warning.
//! 2. Configured label attributes are sanitized (`/`, `.`, `-` become
//!    `_`), validated against the Loki label grammar, added to the static
//!    label set, and - together with the ignore list - removed from the
//!    line body.
//! 3. The remaining record serializes as the JSON line.

mod batch;
mod client;
mod proto;

pub use batch::{Batcher, BatcherConfig, Entry};
pub use client::{HttpPusher, PushError, Pusher};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use flowkube_config::LokiConfig;
use flowkube_health::Reporter;
use flowkube_pipeline::{Submitter, CHANNEL_CAPACITY};
use flowkube_record::Record;

use proto::format_labels;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Errors constructing the exporter (startup-fatal)
#[derive(Debug, Error)]
pub enum LokiExporterError {
    #[error("failed to build Loki HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Loki record exporter
pub struct LokiExporter {
    timestamp_label: String,
    timestamp_scale_nanos: f64,
    static_labels: BTreeMap<String, String>,
    labels: Vec<String>,
    ignore_list: Vec<String>,
    reporter: Arc<Reporter>,
    tx: Option<mpsc::Sender<Entry>>,
    batcher: Option<JoinHandle<()>>,
    pub(crate) now: fn() -> Duration,
}

fn wall_clock() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

impl LokiExporter {
    /// Create the exporter and spawn its batcher
    pub fn new(
        config: &LokiConfig,
        timestamp_label: &str,
        timestamp_scale: Duration,
        reporter: Arc<Reporter>,
    ) -> Result<Self, LokiExporterError> {
        let pusher = HttpPusher::new(config.push_url(), config.tenant_id.clone(), config.timeout)?;
        Ok(Self::with_pusher(
            config,
            timestamp_label,
            timestamp_scale,
            reporter,
            Box::new(pusher),
        ))
    }

    /// Exporter over an arbitrary transport (tests push through fakes)
    pub(crate) fn with_pusher(
        config: &LokiConfig,
        timestamp_label: &str,
        timestamp_scale: Duration,
        reporter: Arc<Reporter>,
        pusher: Box<dyn Pusher>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let batcher = Batcher::new(
            BatcherConfig {
                batch_size: config.batch_size,
                batch_wait: config.batch_wait,
                min_backoff: config.min_backoff,
                max_backoff: config.max_backoff,
                max_retries: config.max_retries,
            },
            pusher,
            Arc::clone(&reporter),
        );

        Self {
            timestamp_label: timestamp_label.to_string(),
            timestamp_scale_nanos: timestamp_scale.as_nanos() as f64,
            static_labels: config.static_labels.clone(),
            labels: config.labels.clone(),
            ignore_list: config.ignore_list.clone(),
            reporter,
            tx: Some(tx),
            batcher: Some(tokio::spawn(batcher.run(rx))),
            now: wall_clock,
        }
    }

    /// Extract and rescale the record timestamp, falling back to the wall
    /// clock when it is absent, non-numeric or zero.
    fn extract_timestamp(&self, record: &Record) -> (i64, i32) {
        if self.timestamp_label.is_empty() {
            return split_duration((self.now)());
        }
        let value = match record.get(&self.timestamp_label) {
            Some(value) => value,
            None => {
                tracing::warn!(
                    timestamp_label = %self.timestamp_label,
                    "timestamp label not found in record, using local time"
                );
                return split_duration((self.now)());
            }
        };
        let t = match value.as_f64() {
            Some(t) => t,
            None => {
                tracing::warn!(
                    timestamp_label = %self.timestamp_label,
                    value = %value,
                    "invalid timestamp found, using local time"
                );
                return split_duration((self.now)());
            }
        };
        if t == 0.0 {
            tracing::warn!(
                timestamp_label = %self.timestamp_label,
                "empty timestamp in record, using local time"
            );
            return split_duration((self.now)());
        }

        let total_nanos = (t * self.timestamp_scale_nanos) as i64;
        (
            total_nanos / NANOS_PER_SEC,
            (total_nanos % NANOS_PER_SEC) as i32,
        )
    }

    /// Process one record into its batcher entry; mutates the record by
    /// stripping promoted and ignored attributes.
    fn build_entry(&self, mut record: Record) -> Result<Entry, serde_json::Error> {
        let (ts_secs, ts_nanos) = self.extract_timestamp(&record);

        let mut labels = self.static_labels.clone();
        add_record_labels(&mut labels, &self.labels, &record);

        // promoted and ignored attributes would otherwise be duplicated
        // between stream labels and line body
        for name in self.labels.iter().chain(self.ignore_list.iter()) {
            record.remove(name);
        }

        Ok(Entry {
            labels: format_labels(&labels),
            ts_secs,
            ts_nanos,
            line: record.to_json()?,
        })
    }
}

#[async_trait]
impl Submitter for LokiExporter {
    async fn submit(&mut self, record: Record) {
        let entry = match self.build_entry(record) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "cannot serialize record for Loki");
                self.reporter.record_discarded("loki_serialize");
                return;
            }
        };
        if let Some(tx) = &self.tx {
            if tx.send(entry).await.is_err() {
                tracing::warn!("loki batcher is gone, dropping record");
                self.reporter.record_discarded("loki_batcher_closed");
            }
        }
    }

    async fn shutdown(&mut self) {
        // closing the channel triggers the batcher's final flush
        self.tx.take();
        if let Some(batcher) = self.batcher.take() {
            let _ = batcher.await;
        }
    }
}

fn split_duration(d: Duration) -> (i64, i32) {
    (d.as_secs() as i64, d.subsec_nanos() as i32)
}

/// Add configured record attributes to the label set, sanitizing keys and
/// skipping anything that is not a valid Loki label even after
/// sanitization.
fn add_record_labels(
    labels: &mut BTreeMap<String, String>,
    names: &[String],
    record: &Record,
) {
    for name in names {
        let Some(value) = record.get(name) else {
            continue;
        };
        let sanitized = sanitize_key(name);
        if !valid_label_name(&sanitized) {
            tracing::debug!(key = %name, sanitized = %sanitized, "invalid label, ignoring it");
            continue;
        }
        let value = value.to_string();
        if value.is_empty() {
            tracing::debug!(key = %name, "invalid label value, ignoring it");
            continue;
        }
        labels.insert(sanitized, value);
    }
}

/// Replace the separators commonly found in attribute names with `_`
fn sanitize_key(key: &str) -> String {
    key.replace(['/', '.', '-'], "_")
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
