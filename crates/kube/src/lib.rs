//! Flowkube - Kubernetes Index
//!
//! Watch-based caches over Pods, Services and ReplicaSets, indexed for the
//! lookups the enricher performs on every flow record.
//!
//! # Overview
//!
//! [`Indexers::start`] probes each kind with a LIST (so authorization
//! problems surface immediately as errors) and spawns one watcher task per
//! kind. Each watcher seeds its store from the watch's initial LIST and
//! keeps it current; [`Indexers::wait_for_sync`] blocks until every kind
//! has completed that initial LIST. Readers go through the
//! [`WorkloadIndex`] trait and never touch the API server:
//!
//! - `pod_by_ip` - pod IPs, excluding host-networked addresses
//! - `service_by_ip` - ClusterIPs, excluding headless services
//! - `replicaset` - `namespace/name` lookup for the owner walk
//!
//! # Consistency
//!
//! Stores hold cheap snapshots ([`PodInfo`], [`ServiceInfo`],
//! [`ReplicaSetInfo`]) extracted at event-apply time, wrapped in `Arc`.
//! A watch event replaces the whole snapshot pointer, so readers observe
//! either the previous or the next version, never a torn one.

mod error;
mod snapshot;
mod store;

pub use error::IndexError;
pub use snapshot::{OwnerRef, PodInfo, ReplicaSetInfo, ServiceInfo};

use std::sync::Arc;

use futures::TryStreamExt;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::ListParams;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use store::{Snapshot, Store};

/// Read access to the indexed Kubernetes objects.
///
/// Implemented by [`Indexers`] and by in-memory fakes in enricher tests.
pub trait WorkloadIndex: Send + Sync {
    fn pod_by_ip(&self, ip: &str) -> Option<Arc<PodInfo>>;
    fn service_by_ip(&self, ip: &str) -> Option<Arc<ServiceInfo>>;
    fn replicaset(&self, namespace: &str, name: &str) -> Option<Arc<ReplicaSetInfo>>;
}

type SharedStore<T> = Arc<RwLock<Store<T>>>;

/// Shared watch-based caches over Pods, Services and ReplicaSets
pub struct Indexers {
    pods: SharedStore<PodInfo>,
    services: SharedStore<ServiceInfo>,
    replicasets: SharedStore<ReplicaSetInfo>,
    synced: Vec<watch::Receiver<bool>>,
}

impl Indexers {
    /// Probe permissions on every kind and spawn the background watchers.
    ///
    /// A failing probe (e.g. RBAC forbids the resource) is returned as an
    /// error; later watch interruptions are retried with backoff and never
    /// tear the index down.
    pub async fn start(client: Client, cancel: CancellationToken) -> Result<Self, IndexError> {
        let pods = spawn_kind::<Pod, PodInfo>(client.clone(), cancel.clone()).await?;
        let services = spawn_kind::<Service, ServiceInfo>(client.clone(), cancel.clone()).await?;
        let replicasets = spawn_kind::<ReplicaSet, ReplicaSetInfo>(client, cancel).await?;

        Ok(Self {
            pods: pods.0,
            services: services.0,
            replicasets: replicasets.0,
            synced: vec![pods.1, services.1, replicasets.1],
        })
    }

    /// Block until every kind has completed its initial LIST, or the token
    /// is cancelled.
    pub async fn wait_for_sync(&self, cancel: &CancellationToken) {
        for rx in &self.synced {
            let mut rx = rx.clone();
            while !*rx.borrow() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

impl WorkloadIndex for Indexers {
    fn pod_by_ip(&self, ip: &str) -> Option<Arc<PodInfo>> {
        self.pods.read().by_ip(ip)
    }

    fn service_by_ip(&self, ip: &str) -> Option<Arc<ServiceInfo>> {
        self.services.read().by_ip(ip)
    }

    fn replicaset(&self, namespace: &str, name: &str) -> Option<Arc<ReplicaSetInfo>> {
        self.replicasets.read().by_name(namespace, name)
    }
}

/// Probe one kind, then spawn its watcher task.
async fn spawn_kind<K, S>(
    client: Client,
    cancel: CancellationToken,
) -> Result<(SharedStore<S>, watch::Receiver<bool>), IndexError>
where
    K: Resource<DynamicType = ()>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned
        + Send
        + Sync
        + 'static,
    S: Snapshot<K> + Send + Sync + 'static,
{
    let kind = K::kind(&()).to_string();
    let api: Api<K> = Api::all(client);

    // cheap LIST so a permanent authorization failure aborts startup
    // instead of looping inside the watcher
    api.list(&ListParams::default().limit(1))
        .await
        .map_err(|source| IndexError::InitialList {
            kind: kind.clone(),
            source,
        })?;

    let store = Arc::new(RwLock::new(Store::<S>::new(kind.clone())));
    let (synced_tx, synced_rx) = watch::channel(false);

    let task_store = Arc::clone(&store);
    tokio::spawn(run_watch(api, task_store, kind, synced_tx, cancel));

    Ok((store, synced_rx))
}

/// Apply watch events to a store until cancellation.
///
/// The watch's initial LIST arrives as a `Restarted` event, which seeds
/// the store and flips the sync flag. Stream errors are logged and retried
/// by the watcher's own backoff; every restart re-LISTs and replaces the
/// store wholesale, reconciling any drift.
async fn run_watch<K, S>(
    api: Api<K>,
    store: SharedStore<S>,
    kind: String,
    synced: watch::Sender<bool>,
    cancel: CancellationToken,
) where
    K: Resource<DynamicType = ()>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned
        + Send
        + 'static,
    S: Snapshot<K> + Send + Sync + 'static,
{
    let mut events = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(kind = %kind, "index watcher stopped");
                return;
            }

            event = events.try_next() => match event {
                Ok(Some(watcher::Event::Applied(obj))) => {
                    store.write().apply(obj);
                }
                Ok(Some(watcher::Event::Deleted(obj))) => {
                    store.write().delete(&obj);
                }
                Ok(Some(watcher::Event::Restarted(objs))) => {
                    tracing::info!(kind = %kind, objects = objs.len(), "index synchronized");
                    store.write().replace_all(objs);
                    let _ = synced.send(true);
                }
                Ok(None) => {
                    tracing::warn!(kind = %kind, "index watch stream ended");
                    return;
                }
                Err(e) => {
                    // the watcher reconnects with backoff on its own
                    tracing::warn!(kind = %kind, error = %e, "index watch error, retrying");
                }
            },
        }
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
