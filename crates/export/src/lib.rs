//! Flowkube - Export
//!
//! Terminal pipeline stages: the Loki submitter (label extraction,
//! batching, snappy-compressed protobuf push with bounded backoff), the
//! Kafka submitter (JSON payload, hash-key partitioning) and two small
//! utility submitters (stdout mirror, fan-out).
//!
//! Exporters own delivery failure: a record that cannot be shipped after
//! the configured retries is dropped and counted as a discard, never
//! propagated back into the pipeline.

mod fanout;
mod kafka;
pub mod loki;
mod stdout;

pub use fanout::FanoutSubmitter;
pub use kafka::{KafkaExporter, KafkaExporterError};
pub use loki::LokiExporter;
pub use stdout::StdoutSubmitter;
