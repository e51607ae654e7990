//! Flowkube - Enricher
//!
//! The transform that decorates flow records with the Kubernetes workload
//! identity of their IP addresses.
//!
//! For every configured `(ip attribute → output prefix)` pair, the enricher
//! resolves the IP against the shared index - pod first, service as a
//! fallback - and walks the pod's owner chain (at most
//! `Pod → ReplicaSet → owner`) to name the managing workload. Lookups are
//! pure reads on the cache snapshot: the enricher never talks to the API
//! server and never fails a record. An IP that resolves to nothing leaves
//! the record untouched.

use std::sync::Arc;

use flowkube_config::Config;
use flowkube_health::Reporter;
use flowkube_kube::{OwnerRef, PodInfo, WorkloadIndex};
use flowkube_pipeline::Transform;
use flowkube_record::{
    Record, SUFFIX_HOST_IP, SUFFIX_NAMESPACE, SUFFIX_POD, SUFFIX_WARN, SUFFIX_WORKLOAD,
    SUFFIX_WORKLOAD_KIND,
};

/// Owner levels consulted: the pod's own reference, then the ReplicaSet's.
const MAX_OWNER_DEPTH: usize = 2;

/// Kubernetes enrichment transform
pub struct Enricher {
    index: Arc<dyn WorkloadIndex>,
    // ordered (ip attribute, output prefix) pairs
    ip_fields: Vec<(String, String)>,
    reporter: Arc<Reporter>,
    print_input: bool,
    print_output: bool,
}

impl Enricher {
    pub fn new(index: Arc<dyn WorkloadIndex>, reporter: Arc<Reporter>, config: &Config) -> Self {
        Self {
            index,
            ip_fields: config
                .ip_fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            reporter,
            print_input: config.print_input,
            print_output: config.print_output,
        }
    }

    fn enrich_ip(&self, record: &mut Record, ip: &str, prefix: &str) {
        if let Some(pod) = self.index.pod_by_ip(ip) {
            self.enrich_pod(record, prefix, &pod);
        } else if let Some(svc) = self.index.service_by_ip(ip) {
            fill_workload(record, prefix, "Service", &svc.name, Some(&svc.namespace));
        } else {
            tracing::warn!(ip = %ip, "no pod or service found for IP");
        }
    }

    fn enrich_pod(&self, record: &mut Record, prefix: &str, pod: &PodInfo) {
        record.set(format!("{prefix}{SUFFIX_POD}"), pod.name.as_str());
        record.set(format!("{prefix}{SUFFIX_NAMESPACE}"), pod.namespace.as_str());
        record.set(format!("{prefix}{SUFFIX_HOST_IP}"), pod.host_ip.as_str());

        let mut warnings = Vec::new();
        if let Some(first) = pod.owners.first() {
            check_too_many(
                &mut warnings,
                &format!("pod {}", pod.name),
                &pod.owners,
            );
            let mut owner = first.clone();
            for _ in 1..MAX_OWNER_DEPTH {
                if owner.kind != "ReplicaSet" {
                    break;
                }
                // search deeper (e.g. Deployment, DeploymentConfig)
                match self.index.replicaset(&pod.namespace, &owner.name) {
                    Some(rs) => {
                        let Some(parent) = rs.owners.first() else {
                            break;
                        };
                        check_too_many(
                            &mut warnings,
                            &format!("replica {}", rs.name),
                            &rs.owners,
                        );
                        owner = parent.clone();
                    }
                    None => {
                        tracing::warn!(
                            namespace = %pod.namespace,
                            name = %owner.name,
                            "failed to get ReplicaSet"
                        );
                        break;
                    }
                }
            }
            fill_workload(record, prefix, &owner.kind, &owner.name, None);
        } else {
            // a pod without owner is considered self-owned
            fill_workload(record, prefix, "Pod", &pod.name, None);
        }

        if !warnings.is_empty() {
            record.set(format!("{prefix}{SUFFIX_WARN}"), warnings.join("; "));
        }
    }
}

impl Transform for Enricher {
    fn name(&self) -> &'static str {
        "kube_enricher"
    }

    fn apply(&self, mut record: Record) -> Record {
        if self.print_input {
            println!("{}", record.to_json().unwrap_or_default());
        }

        for (ip_field, prefix) in &self.ip_fields {
            let ip = match record.get(ip_field) {
                None => {
                    tracing::info!(field = %ip_field, "field not found in record");
                    continue;
                }
                Some(value) => match value.as_str() {
                    Some(ip) => ip.to_string(),
                    None => {
                        tracing::warn!(field = %ip_field, value = %value, "string expected for field");
                        continue;
                    }
                },
            };
            self.enrich_ip(&mut record, &ip, prefix);
        }

        // printed before export so attributes the exporter later promotes
        // to labels are still visible in the body
        if self.print_output {
            println!("{}", record.to_json().unwrap_or_default());
        }

        self.reporter.record_enriched();
        record
    }
}

fn fill_workload(record: &mut Record, prefix: &str, kind: &str, name: &str, namespace: Option<&str>) {
    record.set(format!("{prefix}{SUFFIX_WORKLOAD}"), name);
    record.set(format!("{prefix}{SUFFIX_WORKLOAD_KIND}"), kind);
    if let Some(namespace) = namespace {
        record.set(format!("{prefix}{SUFFIX_NAMESPACE}"), namespace);
    }
}

fn check_too_many(warnings: &mut Vec<String>, subject: &str, owners: &[OwnerRef]) {
    if owners.len() > 1 {
        let names: Vec<String> = owners
            .iter()
            .map(|o| format!("{}/{}", o.kind, o.name))
            .collect();
        tracing::trace!(count = owners.len(), subject = %subject, "several owners found, using first");
        warnings.push(format!(
            "Several owners found for {subject}: {}",
            names.join(",")
        ));
    }
}

#[cfg(test)]
#[path = "enrich_test.rs"]
mod enrich_test;
