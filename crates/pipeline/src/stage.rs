//! Stage traits: ingester, transform, submitter.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use flowkube_record::Record;

/// Acquires flow records from the outside (UDP collector, stdin, ...) and
/// forwards them to the first pipeline stage.
///
/// Implementors spawn their own worker task(s) and MUST close the returned
/// channel (by dropping every sender) when `cancel` fires or their input is
/// exhausted; the close is what propagates shutdown through the pipeline.
pub trait Ingester: Send + 'static {
    fn start(self: Box<Self>, cancel: CancellationToken) -> mpsc::Receiver<Record>;
}

/// Adapter turning a closure into an [`Ingester`], mostly for tests and
/// ad-hoc sources.
pub struct IngesterFn<F>(pub F);

impl<F> Ingester for IngesterFn<F>
where
    F: FnOnce(CancellationToken) -> mpsc::Receiver<Record> + Send + 'static,
{
    fn start(self: Box<Self>, cancel: CancellationToken) -> mpsc::Receiver<Record> {
        (self.0)(cancel)
    }
}

/// Boxed ingesters stay ingesters, so callers can pick one at runtime
impl Ingester for Box<dyn Ingester> {
    fn start(self: Box<Self>, cancel: CancellationToken) -> mpsc::Receiver<Record> {
        (*self).start(cancel)
    }
}

/// Receives a record, returns the (possibly modified) record.
///
/// Transforms are infallible: anything that cannot be resolved leaves the
/// record untouched instead of interrupting the flow. They stop when their
/// input channel closes.
pub trait Transform: Send + Sync + 'static {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Apply the transformation
    fn apply(&self, record: Record) -> Record;
}

/// Forwards flow records to the outside (Loki, Kafka, stdout, ...).
///
/// The terminal stage: it owns delivery, batching and retries, and accounts
/// failed deliveries as discards instead of propagating errors upstream. It
/// stops when its input channel closes.
#[async_trait]
pub trait Submitter: Send + 'static {
    /// Deliver one record (possibly just buffering it)
    async fn submit(&mut self, record: Record);

    /// Flush buffered work; invoked exactly once, after the input closed
    async fn shutdown(&mut self) {}
}

/// Boxed submitters stay submitters, so callers can pick one at runtime
#[async_trait]
impl Submitter for Box<dyn Submitter> {
    async fn submit(&mut self, record: Record) {
        (**self).submit(record).await;
    }

    async fn shutdown(&mut self) {
        (**self).shutdown().await;
    }
}
