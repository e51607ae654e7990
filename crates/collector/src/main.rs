//! flowkube - Kubernetes-aware flow enrichment pipeline
//!
//! # Usage
//!
//! ```bash
//! # NetFlow/IPFIX collector, enriched, shipped to Loki
//! flowkube --config configs/example.yaml
//!
//! # Pre-decoded JSON flows from stdin
//! some-flow-decoder | flowkube
//! ```

mod service;

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flowkube_config::{Config, LogLevel};

/// Kubernetes-aware flow enrichment pipeline
#[derive(Parser, Debug)]
#[command(name = "flowkube", disable_version_flag = true)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "CONFIG")]
    config: Option<PathBuf>,

    /// Path to the kubeconfig file (default: in-cluster configuration)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    loglevel: String,

    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("flowkube {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_logging(&cli.loglevel);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        loglevel = %cli.loglevel,
        "starting flowkube"
    );

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    service::run(config, cli.kubeconfig).await
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) {
    let level = match LogLevel::from_str(level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("{e}, using info");
            LogLevel::Info
        }
    };
    let filter = EnvFilter::new(level.as_str());
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}
