//! Service wiring: build the pipeline from the configuration and run it
//! until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use flowkube_config::{Config, StdinFormat};
use flowkube_enrich::Enricher;
use flowkube_export::{FanoutSubmitter, KafkaExporter, LokiExporter, StdoutSubmitter};
use flowkube_health::{Metrics, Reporter, Status};
use flowkube_ingest::{JsonLineIngester, ProtobufIngester, UdpIngester};
use flowkube_kube::{Indexers, WorkloadIndex};
use flowkube_pipeline::{Ingester, Pipeline, Submitter};

/// Assemble and run the service; returns after a clean shutdown.
pub async fn run(config: Config, kubeconfig: Option<PathBuf>) -> Result<()> {
    let metrics = Arc::new(Metrics::new().context("failed to build metrics registry")?);
    let reporter = Arc::new(Reporter::new(Status::Starting, Arc::clone(&metrics)));
    let cancel = CancellationToken::new();

    let health = {
        let port = config.health.port;
        let reporter = Arc::clone(&reporter);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = flowkube_health::serve(port, reporter, cancel).await {
                tracing::error!(error = %e, "health endpoint failed");
            }
        })
    };

    let result = run_pipeline(&config, kubeconfig, &metrics, &reporter, &cancel).await;
    if result.is_err() {
        reporter.set_status(Status::Error);
    }

    cancel.cancel();
    let _ = health.await;
    result
}

async fn run_pipeline(
    config: &Config,
    kubeconfig: Option<PathBuf>,
    metrics: &Arc<Metrics>,
    reporter: &Arc<Reporter>,
    cancel: &CancellationToken,
) -> Result<()> {
    let ingester = build_ingester(config, metrics)?;
    let submitter = build_submitter(config, reporter)
        .await
        .context("failed to build exporter")?;

    let mut pipeline = Pipeline::new(ingester, submitter);
    if config.enrich {
        let client = build_kube_client(kubeconfig).await?;
        let indexers = Indexers::start(client, cancel.clone())
            .await
            .context("failed to start the Kubernetes index")?;
        tracing::info!("waiting for the Kubernetes index to sync");
        indexers.wait_for_sync(cancel).await;

        let index: Arc<dyn WorkloadIndex> = Arc::new(indexers);
        pipeline = pipeline.with_transform(Enricher::new(index, Arc::clone(reporter), config));
    }

    let done = pipeline.start(cancel.clone()).join();
    tokio::pin!(done);

    reporter.set_status(Status::Ready);
    tracing::info!("flowkube pipeline running");

    tokio::select! {
        _ = &mut done => {
            // input exhausted (e.g. stdin EOF)
            tracing::info!("pipeline finished");
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining");
            cancel.cancel();
            done.await;
        }
    }

    Ok(())
}

fn build_ingester(config: &Config, metrics: &Arc<Metrics>) -> Result<Box<dyn Ingester>> {
    if config.listen.is_empty() {
        tracing::info!(format = ?config.stdin_format, "reading flows from stdin");
        return Ok(match config.stdin_format {
            StdinFormat::Json => Box::new(JsonLineIngester::new(tokio::io::stdin())),
            StdinFormat::Pb => Box::new(ProtobufIngester::new(tokio::io::stdin())),
        });
    }

    tracing::info!(listen = %config.listen, "listening for NetFlow/IPFIX");
    let udp = UdpIngester::bind(&config.listen, Arc::clone(metrics))
        .context("failed to start the UDP listener")?;
    Ok(Box::new(udp))
}

async fn build_submitter(config: &Config, reporter: &Arc<Reporter>) -> Result<Box<dyn Submitter>> {
    let loki = match &config.loki {
        Some(loki_config) => {
            tracing::info!(url = %loki_config.url, "exporting to Loki");
            Some(Box::new(LokiExporter::new(
                loki_config,
                &config.timestamp_label,
                config.timestamp_scale,
                Arc::clone(reporter),
            )?) as Box<dyn Submitter>)
        }
        None => None,
    };
    let kafka = match &config.kafka {
        Some(kafka_config) => {
            tracing::info!(topic = %kafka_config.topic, "exporting to Kafka");
            Some(Box::new(KafkaExporter::new(kafka_config, Arc::clone(reporter))?)
                as Box<dyn Submitter>)
        }
        None => None,
    };

    Ok(match (loki, kafka) {
        (Some(loki), Some(kafka)) => Box::new(FanoutSubmitter::new(vec![loki, kafka])),
        (Some(loki), None) => loki,
        (None, Some(kafka)) => kafka,
        (None, None) => {
            tracing::warn!("no exporter configured, printing records to stdout");
            Box::new(StdoutSubmitter)
        }
    })
}

/// Kubernetes client from, in order: the `--kubeconfig` flag (or the
/// `KUBECONFIG` environment variable, resolved by the CLI), else the
/// inferred environment (local kubeconfig, then in-cluster).
async fn build_kube_client(kubeconfig: Option<PathBuf>) -> Result<kube::Client> {
    let client_config = match kubeconfig {
        Some(path) => {
            tracing::info!(path = %path.display(), "using supplied kubeconfig");
            let kubeconfig = kube::config::Kubeconfig::read_from(&path)
                .with_context(|| format!("can't read kubeconfig at {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(
                kubeconfig,
                &kube::config::KubeConfigOptions::default(),
            )
            .await
            .context("can't load kubeconfig")?
        }
        None => {
            tracing::info!("using inferred Kubernetes configuration");
            kube::Config::infer()
                .await
                .context("can't infer Kubernetes configuration")?
        }
    };
    kube::Client::try_from(client_config).context("can't build Kubernetes client")
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!(error = %e, "cannot install SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
