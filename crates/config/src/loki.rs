//! Loki exporter configuration

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::{ConfigError, Result};

/// Loki exporter configuration
///
/// # Example
///
/// ```yaml
/// loki:
///   url: http://loki:3100/
///   tenantID: netops
///   batchWait: 1s
///   labels:
///     - SrcNamespace
///     - DstNamespace
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LokiConfig {
    /// Base URL of the Loki server; the push path is appended
    pub url: String,

    /// Tenant, sent as the `X-Scope-OrgID` header when non-empty
    #[serde(rename = "tenantID")]
    pub tenant_id: String,

    /// Maximum time to hold an incomplete batch before flushing
    #[serde(with = "humantime_serde")]
    pub batch_wait: Duration,

    /// Maximum accumulated line bytes per batch
    pub batch_size: usize,

    /// HTTP request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Initial retry backoff
    #[serde(with = "humantime_serde")]
    pub min_backoff: Duration,

    /// Retry backoff ceiling
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Retries before a batch is dropped
    pub max_retries: u32,

    /// Record attributes promoted to stream labels (and removed from the
    /// line body)
    pub labels: Vec<String>,

    /// Labels attached to every stream
    pub static_labels: BTreeMap<String, String>,

    /// Record attributes removed from the line body without becoming labels
    pub ignore_list: Vec<String>,
}

impl Default for LokiConfig {
    fn default() -> Self {
        let mut static_labels = BTreeMap::new();
        static_labels.insert("app".to_string(), "flowkube".to_string());
        Self {
            url: "http://loki:3100/".to_string(),
            tenant_id: String::new(),
            batch_wait: Duration::from_secs(1),
            batch_size: 100 * 1024,
            timeout: Duration::from_secs(10),
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5 * 60),
            max_retries: 10,
            labels: Vec::new(),
            static_labels,
            ignore_list: Vec::new(),
        }
    }
}

impl LokiConfig {
    /// Full push endpoint URL
    pub fn push_url(&self) -> String {
        if self.url.ends_with('/') {
            format!("{}loki/api/v1/push", self.url)
        } else {
            format!("{}/loki/api/v1/push", self.url)
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(ConfigError::Invalid("loki.url can't be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(format!(
                "invalid loki.batchSize: {}. Required > 0",
                self.batch_size
            )));
        }
        Ok(())
    }
}
