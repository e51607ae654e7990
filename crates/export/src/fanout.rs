//! Fan-out submitter: every record goes to every configured exporter.

use async_trait::async_trait;

use flowkube_pipeline::Submitter;
use flowkube_record::Record;

/// Delivers each record to all wrapped submitters, in order
pub struct FanoutSubmitter {
    submitters: Vec<Box<dyn Submitter>>,
}

impl FanoutSubmitter {
    pub fn new(submitters: Vec<Box<dyn Submitter>>) -> Self {
        Self { submitters }
    }
}

#[async_trait]
impl Submitter for FanoutSubmitter {
    async fn submit(&mut self, record: Record) {
        let last = self.submitters.len().saturating_sub(1);
        for (i, submitter) in self.submitters.iter_mut().enumerate() {
            if i == last {
                submitter.submit(record).await;
                return;
            }
            submitter.submit(record.clone()).await;
        }
    }

    async fn shutdown(&mut self) {
        for submitter in &mut self.submitters {
            submitter.shutdown().await;
        }
    }
}
