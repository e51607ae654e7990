//! Flowkube - Pipeline
//!
//! The async stage graph that connects one ingester to one submitter
//! through an ordered list of transforms.
//!
//! # Architecture
//!
//! ```text
//! [Ingester] ──chan(20)──▶ [Transform 1] ──chan(20)──▶ ... ──▶ [Submitter]
//! ```
//!
//! # Key Design
//!
//! - **Channel-based**: bounded `tokio::sync::mpsc` channels between stages
//! - **Backpressure**: a slow downstream stage blocks its upstream through
//!   the bounded channel; only the ingester may decide to drop
//! - **Close propagation**: the ingester closes its channel on cancellation
//!   or input exhaustion; every stage exits after draining its input and
//!   drops its own sender, closing the next channel
//! - **Ordering**: a single worker per stage preserves record order from
//!   ingestion to submission
//!
//! # Example
//!
//! ```ignore
//! let pipeline = Pipeline::new(ingester, submitter).with_transform(enricher);
//! let handle = pipeline.start(cancel.clone());
//! // ... later
//! cancel.cancel();
//! handle.join().await;
//! ```

mod stage;

pub use stage::{Ingester, IngesterFn, Submitter, Transform};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use flowkube_record::Record;

/// Capacity of the bounded channels connecting pipeline stages
pub const CHANNEL_CAPACITY: usize = 20;

/// A pipeline wiring one ingester, zero or more transforms, and one
/// submitter.
///
/// Construction does not start any work; [`Pipeline::start`] spawns one
/// task per stage and returns a handle to await their completion.
pub struct Pipeline {
    ingester: Box<dyn Ingester>,
    transforms: Vec<Arc<dyn Transform>>,
    submitter: Box<dyn Submitter>,
}

impl Pipeline {
    /// Create a pipeline from its terminal stages
    pub fn new(ingester: impl Ingester, submitter: impl Submitter) -> Self {
        Self {
            ingester: Box::new(ingester),
            transforms: Vec::new(),
            submitter: Box::new(submitter),
        }
    }

    /// Append a transform stage; transforms run in insertion order
    pub fn with_transform(mut self, transform: impl Transform) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    /// Start all stages.
    ///
    /// The returned handle resolves once every stage worker has exited,
    /// which happens after `cancel` fires (or the ingester's input is
    /// exhausted) and all in-flight records have drained.
    pub fn start(self, cancel: CancellationToken) -> PipelineHandle {
        let transform_count = self.transforms.len();
        let mut input = self.ingester.start(cancel);
        let mut workers = Vec::with_capacity(transform_count + 1);

        for transform in self.transforms {
            let (tx, next) = mpsc::channel(CHANNEL_CAPACITY);
            workers.push(tokio::spawn(run_transform(transform, input, tx)));
            input = next;
        }

        workers.push(tokio::spawn(run_submitter(self.submitter, input)));

        tracing::debug!(transforms = transform_count, "pipeline started");
        PipelineHandle { workers }
    }
}

async fn run_transform(
    transform: Arc<dyn Transform>,
    mut input: mpsc::Receiver<Record>,
    output: mpsc::Sender<Record>,
) {
    while let Some(record) = input.recv().await {
        if output.send(transform.apply(record)).await.is_err() {
            // downstream is gone, nothing left to feed
            break;
        }
    }
    tracing::debug!(transform = transform.name(), "transform stage stopped");
}

async fn run_submitter(mut submitter: Box<dyn Submitter>, mut input: mpsc::Receiver<Record>) {
    while let Some(record) = input.recv().await {
        submitter.submit(record).await;
    }
    submitter.shutdown().await;
    tracing::debug!("submitter stage stopped");
}

/// Handle to a running pipeline
pub struct PipelineHandle {
    workers: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Wait for every stage worker to exit
    pub async fn join(self) {
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
