//! Tests for the Kubernetes enrichment transform

use std::collections::HashMap;
use std::sync::Arc;

use flowkube_config::Config;
use flowkube_health::{Metrics, Reporter, Status};
use flowkube_kube::{OwnerRef, PodInfo, ReplicaSetInfo, ServiceInfo, WorkloadIndex};
use flowkube_pipeline::Transform;
use flowkube_record::Record;

use crate::Enricher;

/// In-memory stand-in for the watch-based index
#[derive(Default)]
struct FakeIndex {
    pods: HashMap<String, Arc<PodInfo>>,
    services: HashMap<String, Arc<ServiceInfo>>,
    replicasets: HashMap<String, Arc<ReplicaSetInfo>>,
}

impl FakeIndex {
    fn add_pod(&mut self, name: &str, namespace: &str, ip: &str, host_ip: &str, owners: Vec<OwnerRef>) {
        self.pods.insert(
            ip.to_string(),
            Arc::new(PodInfo {
                name: name.to_string(),
                namespace: namespace.to_string(),
                host_ip: host_ip.to_string(),
                ips: vec![ip.to_string()],
                owners,
            }),
        );
    }

    fn add_pod_in_deployment(
        &mut self,
        name: &str,
        namespace: &str,
        ip: &str,
        host_ip: &str,
        rs: &str,
        deployment: &str,
    ) {
        self.add_pod(
            name,
            namespace,
            ip,
            host_ip,
            vec![OwnerRef {
                kind: "ReplicaSet".to_string(),
                name: rs.to_string(),
            }],
        );
        self.replicasets.insert(
            format!("{namespace}/{rs}"),
            Arc::new(ReplicaSetInfo {
                name: rs.to_string(),
                namespace: namespace.to_string(),
                owners: vec![OwnerRef {
                    kind: "Deployment".to_string(),
                    name: deployment.to_string(),
                }],
            }),
        );
    }

    fn add_service(&mut self, name: &str, namespace: &str, ip: &str) {
        self.services.insert(
            ip.to_string(),
            Arc::new(ServiceInfo {
                name: name.to_string(),
                namespace: namespace.to_string(),
                cluster_ips: vec![ip.to_string()],
            }),
        );
    }
}

impl WorkloadIndex for FakeIndex {
    fn pod_by_ip(&self, ip: &str) -> Option<Arc<PodInfo>> {
        self.pods.get(ip).cloned()
    }

    fn service_by_ip(&self, ip: &str) -> Option<Arc<ServiceInfo>> {
        self.services.get(ip).cloned()
    }

    fn replicaset(&self, namespace: &str, name: &str) -> Option<Arc<ReplicaSetInfo>> {
        self.replicasets.get(&format!("{namespace}/{name}")).cloned()
    }
}

fn enricher(index: FakeIndex) -> (Enricher, Arc<Reporter>) {
    let reporter = Arc::new(Reporter::new(Status::Starting, Arc::new(Metrics::new().unwrap())));
    let enricher = Enricher::new(Arc::new(index), Arc::clone(&reporter), &Config::default());
    (enricher, reporter)
}

fn flow(src: &str, dst: &str) -> Record {
    let mut record = Record::new();
    record.set("SrcAddr", src);
    record.set("DstAddr", dst);
    record
}

fn expect(pairs: &[(&str, &str)]) -> Record {
    pairs.iter().map(|(k, v)| (k.to_string(), (*v).into())).collect()
}

#[test]
fn test_single_pod_no_match() {
    let mut index = FakeIndex::default();
    index.add_pod("test-pod1", "test-namespace", "10.0.0.1", "10.0.0.100", vec![]);
    let (enricher, reporter) = enricher(index);

    let out = enricher.apply(flow("10.0.0.1", "10.0.0.2"));

    assert_eq!(
        out,
        expect(&[
            ("SrcAddr", "10.0.0.1"),
            ("SrcPod", "test-pod1"),
            ("SrcNamespace", "test-namespace"),
            ("SrcHostIP", "10.0.0.100"),
            ("SrcWorkload", "test-pod1"),
            ("SrcWorkloadKind", "Pod"),
            ("DstAddr", "10.0.0.2"),
        ])
    );
    let text = reporter.metrics().gather_text().unwrap();
    assert!(text.contains("reader_record_enriched 1"));
}

#[test]
fn test_both_sides_enriched() {
    let mut index = FakeIndex::default();
    index.add_pod("test-pod1", "test-namespace", "10.0.0.1", "10.0.0.100", vec![]);
    index.add_pod("test-pod2", "test-namespace", "10.0.0.2", "10.0.0.100", vec![]);
    let (enricher, _) = enricher(index);

    let out = enricher.apply(flow("10.0.0.1", "10.0.0.2"));

    assert_eq!(out.get_str("SrcPod"), Some("test-pod1"));
    assert_eq!(out.get_str("DstPod"), Some("test-pod2"));
    assert_eq!(out.get_str("SrcWorkloadKind"), Some("Pod"));
    assert_eq!(out.get_str("DstWorkloadKind"), Some("Pod"));
}

#[test]
fn test_deployment_owner_walk() {
    let mut index = FakeIndex::default();
    index.add_pod_in_deployment(
        "test-pod1",
        "test-namespace",
        "10.0.0.1",
        "10.0.0.100",
        "test-rs-1",
        "test-deployment1",
    );
    let (enricher, _) = enricher(index);

    let out = enricher.apply(flow("10.0.0.1", "10.0.0.9"));

    assert_eq!(out.get_str("SrcWorkload"), Some("test-deployment1"));
    assert_eq!(out.get_str("SrcWorkloadKind"), Some("Deployment"));
    assert_eq!(out.get_str("SrcPod"), Some("test-pod1"));
    assert!(out.get("SrcWarn").is_none());
}

#[test]
fn test_orphan_replicaset_keeps_rs_workload() {
    let mut index = FakeIndex::default();
    index.add_pod(
        "test-pod1",
        "test-namespace",
        "10.0.0.1",
        "10.0.0.100",
        vec![OwnerRef {
            kind: "ReplicaSet".to_string(),
            name: "standalone-rs".to_string(),
        }],
    );
    index.replicasets.insert(
        "test-namespace/standalone-rs".to_string(),
        Arc::new(ReplicaSetInfo {
            name: "standalone-rs".to_string(),
            namespace: "test-namespace".to_string(),
            owners: vec![],
        }),
    );
    let (enricher, _) = enricher(index);

    let out = enricher.apply(flow("10.0.0.1", "10.0.0.9"));

    assert_eq!(out.get_str("SrcWorkload"), Some("standalone-rs"));
    assert_eq!(out.get_str("SrcWorkloadKind"), Some("ReplicaSet"));
}

#[test]
fn test_service_fallback() {
    let mut index = FakeIndex::default();
    index.add_pod("test-pod1", "test-namespace", "10.0.0.1", "10.0.0.100", vec![]);
    index.add_service("test-service", "test-namespace", "10.0.0.2");
    let (enricher, _) = enricher(index);

    let out = enricher.apply(flow("10.0.0.1", "10.0.0.2"));

    assert_eq!(out.get_str("DstWorkload"), Some("test-service"));
    assert_eq!(out.get_str("DstWorkloadKind"), Some("Service"));
    assert_eq!(out.get_str("DstNamespace"), Some("test-namespace"));
    // service enrichment adds no pod fields
    assert!(out.get("DstPod").is_none());
    assert!(out.get("DstHostIP").is_none());
}

#[test]
fn test_multiple_owners_warn() {
    let mut index = FakeIndex::default();
    index.add_pod(
        "test-pod1",
        "test-namespace",
        "10.0.0.1",
        "10.0.0.100",
        vec![
            OwnerRef {
                kind: "ReplicaSet".to_string(),
                name: "rs-a".to_string(),
            },
            OwnerRef {
                kind: "DaemonSet".to_string(),
                name: "ds-b".to_string(),
            },
        ],
    );
    let (enricher, _) = enricher(index);

    let out = enricher.apply(flow("10.0.0.1", "10.0.0.9"));

    let warn = out.get_str("SrcWarn").unwrap();
    assert!(warn.contains("Several owners found for pod test-pod1"));
    assert!(warn.contains("ReplicaSet/rs-a"));
    assert!(warn.contains("DaemonSet/ds-b"));
    // first owner still selected; unknown RS keeps the reference itself
    assert_eq!(out.get_str("SrcWorkload"), Some("rs-a"));
    assert_eq!(out.get_str("SrcWorkloadKind"), Some("ReplicaSet"));
}

#[test]
fn test_missing_and_non_string_fields_are_skipped() {
    let (enricher, reporter) = enricher(FakeIndex::default());

    let mut record = Record::new();
    record.set("SrcAddr", 42i64); // not a string

    let out = enricher.apply(record);

    let mut expected = Record::new();
    expected.set("SrcAddr", 42i64);
    assert_eq!(out, expected);
    // the record still counts as processed
    let text = reporter.metrics().gather_text().unwrap();
    assert!(text.contains("reader_record_enriched 1"));
}
