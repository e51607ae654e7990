//! Kafka submitter
//!
//! Serializes each record as JSON and produces it to the configured topic.
//! The partition key concatenates the configured hash-key attributes with
//! `-`; when none of them is present the message goes out keyless and the
//! partitioner picks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use thiserror::Error;

use flowkube_config::KafkaConfig;
use flowkube_health::Reporter;
use flowkube_pipeline::Submitter;
use flowkube_record::Record;

/// Discard category for undeliverable messages
const DISCARD_CATEGORY: &str = "kafka_write";

/// Errors constructing the exporter (startup-fatal)
#[derive(Debug, Error)]
pub enum KafkaExporterError {
    #[error("failed to create Kafka producer: {0}")]
    Producer(#[from] rdkafka::error::KafkaError),
}

/// Kafka record exporter
pub struct KafkaExporter {
    producer: FutureProducer,
    topic: String,
    hash_keys: Vec<String>,
    timeout: Duration,
    reporter: Arc<Reporter>,
}

impl KafkaExporter {
    pub fn new(config: &KafkaConfig, reporter: Arc<Reporter>) -> Result<Self, KafkaExporterError> {
        let writer = &config.writer;
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", writer.brokers.join(","))
            .set("partitioner", writer.balancer.partitioner())
            .set("message.send.max.retries", writer.max_attempts.to_string())
            .set("batch.num.messages", writer.max_batch_size.to_string())
            .set("batch.size", writer.max_batch_bytes.to_string())
            .set("linger.ms", writer.batch_timeout.as_millis().to_string())
            .set("socket.timeout.ms", writer.read_timeout.as_millis().to_string())
            .set(
                "message.timeout.ms",
                writer.write_timeout.as_millis().to_string(),
            );
        if config.tls {
            client.set("security.protocol", "ssl");
        }

        Ok(Self {
            producer: client.create()?,
            topic: config.topic.clone(),
            hash_keys: writer.hash_keys.clone(),
            timeout: config.timeout,
            reporter,
        })
    }
}

#[async_trait]
impl Submitter for KafkaExporter {
    async fn submit(&mut self, record: Record) {
        let payload = match record.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "cannot serialize record for Kafka");
                self.reporter.record_discarded("kafka_serialize");
                return;
            }
        };

        let key = hash_key(&record, &self.hash_keys);
        let mut message: FutureRecord<'_, String, String> =
            FutureRecord::to(&self.topic).payload(&payload);
        if let Some(key) = &key {
            message = message.key(key);
        }

        match self
            .producer
            .send(message, Timeout::After(self.timeout))
            .await
        {
            Ok((partition, offset)) => {
                tracing::trace!(
                    topic = %self.topic,
                    partition,
                    offset,
                    key = key.as_deref().unwrap_or(""),
                    "produced record"
                );
            }
            Err((e, _)) => {
                tracing::warn!(topic = %self.topic, error = %e, "Kafka write failed, dropping record");
                self.reporter.record_discarded(DISCARD_CATEGORY);
            }
        }
    }

    async fn shutdown(&mut self) {
        use rdkafka::producer::Producer;
        if let Err(e) = self.producer.flush(Timeout::After(self.timeout)) {
            tracing::warn!(error = %e, "Kafka flush on shutdown failed");
        }
    }
}

/// Partition key from the configured attributes present in the record;
/// `None` leaves partition selection to the broker/partitioner.
fn hash_key(record: &Record, fields: &[String]) -> Option<String> {
    let parts: Vec<String> = fields
        .iter()
        .filter_map(|field| record.get(field).map(|v| v.to_string()))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("-"))
    }
}

#[cfg(test)]
#[path = "kafka_test.rs"]
mod kafka_test;
