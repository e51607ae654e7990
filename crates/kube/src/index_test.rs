//! Tests for the object stores and snapshot extraction

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{Pod, PodIP, PodStatus, Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use crate::snapshot::{PodInfo, ReplicaSetInfo, ServiceInfo};
use crate::store::{Snapshot, Store};
use crate::OwnerRef;

fn pod(name: &str, namespace: &str, ips: &[&str], host_ip: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        status: Some(PodStatus {
            host_ip: Some(host_ip.to_string()),
            pod_ips: Some(
                ips.iter()
                    .map(|ip| PodIP {
                        ip: Some(ip.to_string()),
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn owned_pod(name: &str, namespace: &str, ip: &str, owner_kind: &str, owner_name: &str) -> Pod {
    let mut pod = pod(name, namespace, &[ip], "10.0.0.100");
    pod.metadata.owner_references = Some(vec![OwnerReference {
        kind: owner_kind.to_string(),
        name: owner_name.to_string(),
        ..Default::default()
    }]);
    pod
}

fn service(name: &str, namespace: &str, cluster_ip: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some(cluster_ip.to_string()),
            cluster_ips: Some(vec![cluster_ip.to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_store() -> Store<PodInfo> {
    Store::new("Pod".to_string())
}

#[test]
fn test_pod_indexed_by_every_ip() {
    let mut store = pod_store();
    store.apply(pod("p1", "default", &["10.0.0.1", "fd00::1"], "10.0.0.100"));

    assert_eq!(store.by_ip("10.0.0.1").unwrap().name, "p1");
    assert_eq!(store.by_ip("fd00::1").unwrap().name, "p1");
    assert_eq!(store.by_name("default", "p1").unwrap().host_ip, "10.0.0.100");
    assert!(store.by_ip("10.0.0.2").is_none());
}

#[test]
fn test_host_networked_ip_excluded() {
    let mut store = pod_store();
    store.apply(pod("hostpod", "kube-system", &["10.0.0.100"], "10.0.0.100"));

    assert!(store.by_ip("10.0.0.100").is_none());
    // the pod itself is still stored by name
    assert!(store.by_name("kube-system", "hostpod").is_some());
}

#[test]
fn test_duplicate_ip_first_wins() {
    let mut store = pod_store();
    store.apply(pod("old", "default", &["10.0.0.1"], "10.0.0.100"));
    store.apply(pod("new", "default", &["10.0.0.1"], "10.0.0.101"));

    assert_eq!(store.by_ip("10.0.0.1").unwrap().name, "old");

    // once the first owner of the IP is gone, the second takes over
    store.delete(&pod("old", "default", &["10.0.0.1"], "10.0.0.100"));
    assert_eq!(store.by_ip("10.0.0.1").unwrap().name, "new");
}

#[test]
fn test_modify_replaces_indexed_ips() {
    let mut store = pod_store();
    store.apply(pod("p1", "default", &["10.0.0.1"], "10.0.0.100"));
    store.apply(pod("p1", "default", &["10.0.0.2"], "10.0.0.100"));

    assert!(store.by_ip("10.0.0.1").is_none());
    assert_eq!(store.by_ip("10.0.0.2").unwrap().name, "p1");
}

#[test]
fn test_delete_removes_all_indexes() {
    let mut store = pod_store();
    store.apply(pod("p1", "default", &["10.0.0.1"], "10.0.0.100"));
    store.delete(&pod("p1", "default", &["10.0.0.1"], "10.0.0.100"));

    assert!(store.by_ip("10.0.0.1").is_none());
    assert!(store.by_name("default", "p1").is_none());
    assert_eq!(store.len(), 0);
}

#[test]
fn test_replace_all_resets_the_store() {
    let mut store = pod_store();
    store.apply(pod("stale", "default", &["10.0.0.1"], "10.0.0.100"));
    store.replace_all(vec![pod("fresh", "default", &["10.0.0.2"], "10.0.0.100")]);

    assert!(store.by_ip("10.0.0.1").is_none());
    assert_eq!(store.by_ip("10.0.0.2").unwrap().name, "fresh");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_pod_without_name_is_skipped() {
    let mut store = pod_store();
    store.apply(Pod::default());
    assert_eq!(store.len(), 0);
}

#[test]
fn test_pod_owner_references() {
    let info =
        PodInfo::from_object(&owned_pod("p1", "default", "10.0.0.1", "ReplicaSet", "rs1")).unwrap();
    assert_eq!(
        info.owners,
        vec![OwnerRef {
            kind: "ReplicaSet".to_string(),
            name: "rs1".to_string(),
        }]
    );
}

#[test]
fn test_service_indexed_by_cluster_ip() {
    let mut store: Store<ServiceInfo> = Store::new("Service".to_string());
    store.apply(service("svc1", "test-namespace", "10.96.0.10"));

    let svc = store.by_ip("10.96.0.10").unwrap();
    assert_eq!(svc.name, "svc1");
    assert_eq!(svc.namespace, "test-namespace");
}

#[test]
fn test_headless_service_not_indexed() {
    let mut store: Store<ServiceInfo> = Store::new("Service".to_string());
    let mut svc = service("headless", "default", "None");
    svc.spec.as_mut().unwrap().cluster_ips = None;
    store.apply(svc);

    assert!(store.by_ip("None").is_none());
    assert!(store.by_name("default", "headless").is_some());
}

#[test]
fn test_replicaset_lookup_and_owners() {
    let mut store: Store<ReplicaSetInfo> = Store::new("ReplicaSet".to_string());
    store.apply(ReplicaSet {
        metadata: ObjectMeta {
            name: Some("rs1".to_string()),
            namespace: Some("default".to_string()),
            owner_references: Some(vec![OwnerReference {
                kind: "Deployment".to_string(),
                name: "d1".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        },
        ..Default::default()
    });

    let rs = store.by_name("default", "rs1").unwrap();
    assert_eq!(rs.owners[0].kind, "Deployment");
    assert_eq!(rs.owners[0].name, "d1");
}
