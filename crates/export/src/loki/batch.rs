//! Stream batching and retry for the Loki exporter.
//!
//! Entries are grouped by their formatted label set. A batch flushes when
//! its accumulated line bytes exceed `batch_size` or `batch_wait` has
//! elapsed since its first entry, and once more on shutdown. A flush that
//! exhausts its retries drops the batch and counts every entry as a
//! discard.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tokio::sync::mpsc;
use tokio::time::Instant;

use flowkube_health::Reporter;

use super::client::Pusher;
use super::proto::{compress, EntryAdapter, PushRequest, StreamAdapter, Timestamp};

/// Discard category for batches dropped after retry exhaustion
const DISCARD_CATEGORY: &str = "loki_batch_dropped";

/// One record, processed into its Loki shape
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Formatted stream labels (`{k="v",...}`)
    pub labels: String,
    pub ts_secs: i64,
    pub ts_nanos: i32,
    pub line: String,
}

/// Batching parameters (from `LokiConfig`)
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: u32,
}

pub struct Batcher {
    config: BatcherConfig,
    pusher: Box<dyn Pusher>,
    reporter: Arc<Reporter>,
    streams: BTreeMap<String, Vec<EntryAdapter>>,
    entries: usize,
    bytes: usize,
    first_entry_at: Option<Instant>,
}

impl Batcher {
    pub fn new(config: BatcherConfig, pusher: Box<dyn Pusher>, reporter: Arc<Reporter>) -> Self {
        Self {
            config,
            pusher,
            reporter,
            streams: BTreeMap::new(),
            entries: 0,
            bytes: 0,
            first_entry_at: None,
        }
    }

    /// Consume entries until the channel closes, flushing on size and age
    pub async fn run(mut self, mut rx: mpsc::Receiver<Entry>) {
        loop {
            let deadline = self
                .first_entry_at
                .map(|start| start + self.config.batch_wait);

            tokio::select! {
                entry = rx.recv() => match entry {
                    Some(entry) => {
                        self.add(entry);
                        if self.bytes >= self.config.batch_size {
                            self.flush().await;
                        }
                    }
                    None => break,
                },

                _ = wait_until(deadline), if deadline.is_some() => {
                    self.flush().await;
                }
            }
        }

        // final flush so cancellation does not lose buffered entries
        self.flush().await;
        tracing::debug!("loki batcher stopped");
    }

    fn add(&mut self, entry: Entry) {
        if self.first_entry_at.is_none() {
            self.first_entry_at = Some(Instant::now());
        }
        self.bytes += entry.line.len();
        self.entries += 1;
        self.streams
            .entry(entry.labels)
            .or_default()
            .push(EntryAdapter {
                timestamp: Some(Timestamp {
                    seconds: entry.ts_secs,
                    nanos: entry.ts_nanos,
                }),
                line: entry.line,
            });
    }

    async fn flush(&mut self) {
        if self.entries == 0 {
            return;
        }

        let streams = std::mem::take(&mut self.streams);
        let entries = self.entries;
        self.entries = 0;
        self.bytes = 0;
        self.first_entry_at = None;

        let request = PushRequest {
            streams: streams
                .into_iter()
                .map(|(labels, entries)| StreamAdapter { labels, entries })
                .collect(),
        };
        let body = match compress(&request.encode_to_vec()) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to compress Loki batch, dropping");
                self.discard(entries);
                return;
            }
        };

        let mut backoff = self.config.min_backoff;
        for attempt in 0..=self.config.max_retries {
            match self.pusher.push(body.clone()).await {
                Ok(()) => {
                    tracing::debug!(entries, bytes = body.len(), "pushed batch to Loki");
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "Loki push failed"
                    );
                }
            }
            if attempt < self.config.max_retries {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.config.max_backoff);
            }
        }

        tracing::error!(entries, "Loki batch dropped after retry exhaustion");
        self.discard(entries);
    }

    fn discard(&self, entries: usize) {
        for _ in 0..entries {
            self.reporter.record_discarded(DISCARD_CATEGORY);
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        // branch is disabled by the `if` guard; never actually awaited
        None => std::future::pending().await,
    }
}
