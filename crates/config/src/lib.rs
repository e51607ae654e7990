//! Flowkube Configuration
//!
//! YAML-based configuration loading with sensible defaults.
//! A minimal config should just work - only specify what you need to change.
//!
//! # Example Minimal Config
//!
//! ```yaml
//! listen: netflow://0.0.0.0:2055
//! loki:
//!   url: http://loki:3100/
//! ```
//!
//! # Example Full Config
//!
//! See `configs/example.yaml` for all available options.

mod error;
mod kafka;
mod logging;
mod loki;

pub use error::{ConfigError, Result};
pub use kafka::{KafkaBalancer, KafkaConfig, KafkaWriterConfig};
pub use logging::LogLevel;
pub use loki::LokiConfig;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Format of pre-decoded records read from stdin
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StdinFormat {
    /// One JSON object per line (default)
    #[default]
    Json,
    /// Varint-length-prefixed protobuf flow messages
    Pb,
}

/// Health/metrics HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthConfig {
    /// Listen port for `/health` and `/metrics`
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Flow listening address as a URL (`netflow://host:port` for NetFlow
    /// v9/IPFIX, `nfl://host:port` for legacy NetFlow v5). Empty means
    /// records are read from stdin.
    pub listen: String,

    /// Stdin record format, when `listen` is empty
    pub stdin_format: StdinFormat,

    /// Mapping of record attributes containing IPs to the prefix of the
    /// enriched attributes written back (e.g. `SrcAddr` → `Src`)
    pub ip_fields: BTreeMap<String, String>,

    /// Record attribute carrying the flow timestamp. Empty disables
    /// extraction (exporters use the wall clock).
    pub timestamp_label: String,

    /// Scale of one unit of the timestamp attribute. UNIX time is `1s`;
    /// other clock sources may use `1ms` or `1us`.
    #[serde(with = "humantime_serde")]
    pub timestamp_scale: Duration,

    /// Whether Kubernetes enrichment is enabled
    pub enrich: bool,

    /// Debug mirror: print every record to stdout before enrichment
    pub print_input: bool,

    /// Debug mirror: print every record to stdout after enrichment
    pub print_output: bool,

    /// Loki exporter (absent = not exported to Loki)
    pub loki: Option<LokiConfig>,

    /// Kafka exporter (absent = not exported to Kafka)
    pub kafka: Option<KafkaConfig>,

    /// Health/metrics HTTP server
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut ip_fields = BTreeMap::new();
        ip_fields.insert("SrcAddr".to_string(), "Src".to_string());
        ip_fields.insert("DstAddr".to_string(), "Dst".to_string());
        Self {
            listen: String::new(),
            stdin_format: StdinFormat::default(),
            ip_fields,
            timestamp_label: "TimeReceived".to_string(),
            timestamp_scale: Duration::from_secs(1),
            enrich: true,
            print_input: false,
            print_output: false,
            loki: None,
            kafka: None,
            health: HealthConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid YAML,
    /// or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        contents.parse()
    }

    /// Validate the configuration
    ///
    /// Invalid values here are startup-fatal: a misconfigured exporter must
    /// refuse to run rather than silently drop records later.
    fn validate(&self) -> Result<()> {
        if self.timestamp_scale.is_zero() {
            return Err(ConfigError::Invalid(
                "timestampScale must be a duration > 0 (e.g. 1m, 1s or 1ms)".into(),
            ));
        }
        if let Some(loki) = &self.loki {
            loki.validate()?;
        }
        if let Some(kafka) = &self.kafka {
            kafka.validate()?;
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(s).map_err(ConfigError::Parse)?;
        config.validate()?;
        tracing::debug!(?config, "loaded configuration");
        Ok(config)
    }
}
