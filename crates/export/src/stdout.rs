//! Stdout submitter, used when no exporter is configured.

use async_trait::async_trait;

use flowkube_pipeline::Submitter;
use flowkube_record::Record;

/// Prints each record as one JSON line
#[derive(Debug, Default)]
pub struct StdoutSubmitter;

#[async_trait]
impl Submitter for StdoutSubmitter {
    async fn submit(&mut self, record: Record) {
        match record.to_json() {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "cannot serialize record"),
        }
    }
}
