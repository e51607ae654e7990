//! Lean snapshots of the watched Kubernetes objects.
//!
//! Only the fields the enricher reads are kept; everything else from the
//! API objects is dropped at event-apply time.

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::store::{object_key, Indexed, Snapshot};

/// A child object's back-pointer to its managing parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

/// Pod snapshot, indexed by its non-host IPs
#[derive(Debug, Clone)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub host_ip: String,
    pub ips: Vec<String>,
    pub owners: Vec<OwnerRef>,
}

/// Service snapshot, indexed by its ClusterIPs (empty when headless)
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    pub cluster_ips: Vec<String>,
}

/// ReplicaSet snapshot, indexed by name only
#[derive(Debug, Clone)]
pub struct ReplicaSetInfo {
    pub name: String,
    pub namespace: String,
    pub owners: Vec<OwnerRef>,
}

fn owner_refs(metadata: &ObjectMeta) -> Vec<OwnerRef> {
    metadata
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|r| OwnerRef {
            kind: r.kind.clone(),
            name: r.name.clone(),
        })
        .collect()
}

fn metadata_key(metadata: &ObjectMeta) -> Option<String> {
    let name = metadata.name.as_deref()?;
    let namespace = metadata.namespace.as_deref().unwrap_or_default();
    Some(object_key(namespace, name))
}

impl Indexed for PodInfo {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ips(&self) -> &[String] {
        &self.ips
    }
}

impl Snapshot<Pod> for PodInfo {
    fn from_object(pod: &Pod) -> Option<Self> {
        let name = pod.metadata.name.clone()?;
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let status = pod.status.as_ref();
        let host_ip = status
            .and_then(|s| s.host_ip.clone())
            .unwrap_or_default();

        // host-networked addresses are excluded so the host IP is never
        // ambiguously mapped to one of its pods
        let mut ips = Vec::new();
        for entry in status.and_then(|s| s.pod_ips.as_deref()).unwrap_or_default() {
            match entry.ip.as_deref() {
                Some(ip) if ip != host_ip => ips.push(ip.to_string()),
                _ => {}
            }
        }

        Some(Self {
            name,
            namespace,
            host_ip,
            ips,
            owners: owner_refs(&pod.metadata),
        })
    }

    fn key_of(pod: &Pod) -> Option<String> {
        metadata_key(&pod.metadata)
    }
}

impl Indexed for ServiceInfo {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ips(&self) -> &[String] {
        &self.cluster_ips
    }
}

impl Snapshot<Service> for ServiceInfo {
    fn from_object(svc: &Service) -> Option<Self> {
        let name = svc.metadata.name.clone()?;
        let namespace = svc.metadata.namespace.clone().unwrap_or_default();

        let mut cluster_ips = Vec::new();
        if let Some(spec) = svc.spec.as_ref() {
            let headless = spec.cluster_ip.as_deref() == Some("None");
            if !headless {
                if let Some(ips) = spec.cluster_ips.as_ref() {
                    cluster_ips.extend(ips.iter().cloned());
                } else if let Some(ip) = spec.cluster_ip.as_ref() {
                    cluster_ips.push(ip.clone());
                }
            }
        }

        Some(Self {
            name,
            namespace,
            cluster_ips,
        })
    }

    fn key_of(svc: &Service) -> Option<String> {
        metadata_key(&svc.metadata)
    }
}

impl Indexed for ReplicaSetInfo {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ips(&self) -> &[String] {
        &[]
    }
}

impl Snapshot<ReplicaSet> for ReplicaSetInfo {
    fn from_object(rs: &ReplicaSet) -> Option<Self> {
        let name = rs.metadata.name.clone()?;
        let namespace = rs.metadata.namespace.clone().unwrap_or_default();
        Some(Self {
            name,
            namespace,
            owners: owner_refs(&rs.metadata),
        })
    }

    fn key_of(rs: &ReplicaSet) -> Option<String> {
        metadata_key(&rs.metadata)
    }
}
