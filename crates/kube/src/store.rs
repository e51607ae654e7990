//! Generic object store with a primary `namespace/name` key and a
//! secondary IP index.

use std::collections::HashMap;
use std::sync::Arc;

/// Identity and index keys of a stored snapshot.
///
/// `ips` is the deterministic secondary index function of the kind (empty
/// for kinds indexed by name only).
pub trait Indexed {
    fn namespace(&self) -> &str;
    fn name(&self) -> &str;
    fn ips(&self) -> &[String];
}

/// Snapshot extraction from a watched Kubernetes object.
///
/// `from_object` returns `None` for objects without identity (no name in
/// metadata); those are skipped.
pub trait Snapshot<K>: Indexed + Sized {
    fn from_object(obj: &K) -> Option<Self>;
    fn key_of(obj: &K) -> Option<String>;
}

pub(crate) fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// In-memory store for one object kind
pub struct Store<S> {
    kind: String,
    by_key: HashMap<String, Arc<S>>,
    // ip → primary keys, insertion-ordered so the first inserted wins
    by_ip: HashMap<String, Vec<String>>,
}

impl<S: Indexed> Store<S> {
    pub fn new(kind: String) -> Self {
        Self {
            kind,
            by_key: HashMap::new(),
            by_ip: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Insert or update an object (ADDED/MODIFIED)
    pub fn apply<K>(&mut self, obj: K)
    where
        S: Snapshot<K>,
    {
        let Some(snapshot) = S::from_object(&obj) else {
            return;
        };
        let key = object_key(snapshot.namespace(), snapshot.name());
        self.unindex(&key);

        let snapshot = Arc::new(snapshot);
        for ip in snapshot.ips() {
            let keys = self.by_ip.entry(ip.clone()).or_default();
            if !keys.contains(&key) {
                keys.push(key.clone());
            }
            if keys.len() > 1 {
                tracing::warn!(
                    kind = %self.kind,
                    ip = %ip,
                    candidates = ?keys,
                    "multiple objects index the same IP, keeping the first"
                );
            }
        }
        self.by_key.insert(key, snapshot);
    }

    /// Remove an object (DELETED)
    pub fn delete<K>(&mut self, obj: &K)
    where
        S: Snapshot<K>,
    {
        if let Some(key) = S::key_of(obj) {
            self.unindex(&key);
            self.by_key.remove(&key);
        }
    }

    /// Replace the whole store (initial LIST or watch restart)
    pub fn replace_all<K>(&mut self, objs: Vec<K>)
    where
        S: Snapshot<K>,
    {
        self.by_key.clear();
        self.by_ip.clear();
        for obj in objs {
            self.apply(obj);
        }
    }

    /// Look up by indexed IP; on collisions the first-inserted object wins
    /// and the collision is logged with every candidate.
    pub fn by_ip(&self, ip: &str) -> Option<Arc<S>> {
        let keys = self.by_ip.get(ip)?;
        if keys.len() > 1 {
            tracing::warn!(
                kind = %self.kind,
                ip = %ip,
                candidates = ?keys,
                "multiple objects for a single IP, returning the first"
            );
        }
        keys.first().and_then(|key| self.by_key.get(key)).cloned()
    }

    /// Look up by `namespace/name`
    pub fn by_name(&self, namespace: &str, name: &str) -> Option<Arc<S>> {
        self.by_key.get(&object_key(namespace, name)).cloned()
    }

    /// Drop an existing object's secondary index entries
    fn unindex(&mut self, key: &str) {
        let ips: Vec<String> = match self.by_key.get(key) {
            Some(previous) => previous.ips().to_vec(),
            None => return,
        };
        for ip in &ips {
            if let Some(keys) = self.by_ip.get_mut(ip) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    self.by_ip.remove(ip);
                }
            }
        }
    }
}
