//! Metric families and their registry.
//!
//! Every counter the process exposes is created here, against a registry
//! built by the same constructor. Tests build a fresh `Metrics` instead of
//! sharing process-wide state.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// All metric families exposed on `/metrics`
pub struct Metrics {
    registry: Registry,

    pub(crate) record_enriched: IntCounter,
    pub(crate) record_discarded: IntCounterVec,

    /// Flows decoded, per exporter address and protocol version
    pub nf_count: IntCounterVec,

    /// Decode failures, per exporter address and error category
    pub nf_errors: IntCounterVec,

    /// Template records installed, per exporter address, protocol version
    /// and template type (`template` / `options_template`)
    pub nf_templates: IntCounterVec,
}

impl Metrics {
    /// Build the registry and every counter family
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let record_enriched = IntCounter::with_opts(Opts::new(
            "reader_record_enriched",
            "Number of records that have been successfully received and enriched.",
        ))?;
        let record_discarded = IntCounterVec::new(
            Opts::new(
                "reader_record_discarded",
                "Number of received records that could not be delivered.",
            ),
            &["error"],
        )?;
        let nf_count = IntCounterVec::new(
            Opts::new(
                "flow_process_nf_count",
                "Number of NetFlow/IPFIX flow records decoded.",
            ),
            &["router", "version"],
        )?;
        let nf_errors = IntCounterVec::new(
            Opts::new(
                "flow_process_nf_errors_count",
                "Number of NetFlow/IPFIX datagrams or records that failed to decode.",
            ),
            &["router", "error"],
        )?;
        let nf_templates = IntCounterVec::new(
            Opts::new(
                "flow_templates_count",
                "Number of NetFlow/IPFIX template records received.",
            ),
            &["router", "version", "type"],
        )?;

        registry.register(Box::new(record_enriched.clone()))?;
        registry.register(Box::new(record_discarded.clone()))?;
        registry.register(Box::new(nf_count.clone()))?;
        registry.register(Box::new(nf_errors.clone()))?;
        registry.register(Box::new(nf_templates.clone()))?;

        Ok(Self {
            registry,
            record_enriched,
            record_discarded,
            nf_count,
            nf_errors,
            nf_templates,
        })
    }

    /// Render every family in the Prometheus text format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
