//! Kafka exporter configuration

use std::time::Duration;

use serde::Deserialize;

use crate::{ConfigError, Result};

/// Partition balancing strategy for the Kafka writer
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum KafkaBalancer {
    #[default]
    RoundRobin,
    LeastBytes,
    Hash,
    Crc32,
    Murmur2,
}

impl KafkaBalancer {
    /// The librdkafka partitioner this balancer maps onto.
    ///
    /// librdkafka has no byte-count balancer, so `LeastBytes` degrades to
    /// random assignment.
    pub fn partitioner(&self) -> &'static str {
        match self {
            KafkaBalancer::RoundRobin | KafkaBalancer::LeastBytes => "random",
            KafkaBalancer::Hash => "consistent_random",
            KafkaBalancer::Crc32 => "consistent",
            KafkaBalancer::Murmur2 => "murmur2_random",
        }
    }
}

/// Kafka writer tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KafkaWriterConfig {
    /// Bootstrap brokers (`host:port`)
    pub brokers: Vec<String>,

    /// Partition balancing strategy
    pub balancer: KafkaBalancer,

    /// Record attributes concatenated into the partition key
    pub hash_keys: Vec<String>,

    /// Delivery attempts before a message is dropped
    pub max_attempts: u32,

    /// Maximum messages buffered per producer batch
    pub max_batch_size: usize,

    /// Maximum bytes buffered per producer batch
    pub max_batch_bytes: usize,

    /// Time a batch may linger before transmission
    #[serde(with = "humantime_serde")]
    pub batch_timeout: Duration,

    /// Broker response read timeout
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Broker write timeout
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
}

impl Default for KafkaWriterConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            balancer: KafkaBalancer::default(),
            hash_keys: Vec::new(),
            max_attempts: 3,
            max_batch_size: 100,
            max_batch_bytes: 1024 * 1024,
            batch_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Kafka exporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KafkaConfig {
    /// Enable TLS towards the brokers
    pub tls: bool,

    /// Per-message delivery timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Destination topic
    pub topic: String,

    /// Writer tuning
    pub writer: KafkaWriterConfig,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            tls: false,
            timeout: Duration::from_secs(5),
            topic: "flowkube".to_string(),
            writer: KafkaWriterConfig::default(),
        }
    }
}

impl KafkaConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.topic.is_empty() {
            return Err(ConfigError::Invalid("kafka.topic can't be empty".into()));
        }
        if self.writer.brokers.is_empty() {
            return Err(ConfigError::Invalid(
                "you must provide kafka.writer.brokers".into(),
            ));
        }
        if self.writer.max_batch_size == 0 {
            return Err(ConfigError::Invalid(format!(
                "invalid kafka.writer.maxBatchSize: {}. Required > 0",
                self.writer.max_batch_size
            )));
        }
        Ok(())
    }
}
