//! Flowkube - Ingest
//!
//! Flow record sources: the UDP NetFlow/IPFIX collector and the framed
//! stdin readers.
//!
//! All sources implement the pipeline [`Ingester`] contract: they spawn
//! their own worker task(s), emit [`Record`]s on the channel they return,
//! and close that channel on cancellation or input exhaustion.
//!
//! # Sources
//!
//! - [`UdpIngester`] - binds a UDP socket, decodes NetFlow v5/v9/IPFIX
//!   datagrams with per-observation-domain template tracking
//! - [`JsonLineIngester`] - one JSON object per line
//! - [`ProtobufIngester`] - varint-length-prefixed protobuf flow messages
//!
//! [`Ingester`]: flowkube_pipeline::Ingester
//! [`Record`]: flowkube_record::Record

pub mod netflow;
mod pb;
mod stdin;

pub use netflow::{UdpIngester, UdpIngesterError};
pub use pb::FlowMessage;
pub use stdin::{JsonLineIngester, ProtobufIngester};
