//! In-process cluster used by tests and the CLI dry runs.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ClusterClient, ClusterFuture};
use crate::error::ClusterError;
use crate::object::{DynamicObject, ObjectKey};

/// Cluster operation, used for call accounting and fault injection.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ClusterOp {
    /// [`ClusterClient::get`].
    Get,
    /// [`ClusterClient::list`].
    List,
    /// [`ClusterClient::create`].
    Create,
    /// [`ClusterClient::update`].
    Update,
    /// [`ClusterClient::patch_status`].
    PatchStatus,
    /// [`ClusterClient::delete`].
    Delete,
}

type StoreKey = (String, ObjectKey);

#[derive(Debug, Default)]
struct Store {
    objects: BTreeMap<StoreKey, DynamicObject>,
    last_version: u64,
    calls: BTreeMap<ClusterOp, usize>,
    failures: VecDeque<(ClusterOp, ClusterError)>,
}

impl Store {
    fn record(&mut self, op: ClusterOp) -> Result<(), ClusterError> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.failures.front().is_some_and(|(pending, _)| *pending == op) {
            if let Some((_, err)) = self.failures.pop_front() {
                return Err(err);
            }
        }
        Ok(())
    }

    const fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }
}

/// Thread-safe in-memory [`ClusterClient`].
///
/// Clones share the same store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCluster {
    store: Arc<Mutex<Store>>,
}

impl InMemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls made for the operation so far.
    pub async fn calls(&self, op: ClusterOp) -> usize {
        self.store.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    /// Total number of write calls (create, update, status patch, delete).
    pub async fn write_calls(&self) -> usize {
        let store = self.store.lock().await;
        [
            ClusterOp::Create,
            ClusterOp::Update,
            ClusterOp::PatchStatus,
            ClusterOp::Delete,
        ]
        .iter()
        .filter_map(|op| store.calls.get(op))
        .sum()
    }

    /// Makes the next call of `op` fail with `err`.
    ///
    /// Failures queue in FIFO order and fire only when `op` is at the front.
    pub async fn fail_next(&self, op: ClusterOp, err: ClusterError) {
        self.store.lock().await.failures.push_back((op, err));
    }

    /// Number of stored objects of a kind.
    pub async fn count(&self, kind: &str) -> usize {
        self.store
            .lock()
            .await
            .objects
            .keys()
            .filter(|(stored_kind, _)| stored_kind == kind)
            .count()
    }
}

fn store_key(kind: &str, key: &ObjectKey) -> StoreKey {
    (kind.to_owned(), key.clone())
}

fn not_found(kind: &str, key: &ObjectKey) -> ClusterError {
    ClusterError::NotFound {
        kind: kind.to_owned(),
        key: key.clone(),
    }
}

impl ClusterClient for InMemoryCluster {
    fn get<'a>(
        &'a self,
        kind: &'a str,
        key: &'a ObjectKey,
    ) -> ClusterFuture<'a, Option<DynamicObject>> {
        Box::pin(async move {
            let mut store = self.store.lock().await;
            store.record(ClusterOp::Get)?;
            Ok(store.objects.get(&store_key(kind, key)).cloned())
        })
    }

    fn list<'a>(
        &'a self,
        kind: &'a str,
        namespace: &'a str,
    ) -> ClusterFuture<'a, Vec<DynamicObject>> {
        Box::pin(async move {
            let mut store = self.store.lock().await;
            store.record(ClusterOp::List)?;
            Ok(store
                .objects
                .iter()
                .filter(|((stored_kind, key), _)| stored_kind == kind && key.namespace == namespace)
                .map(|(_, object)| object.clone())
                .collect())
        })
    }

    fn create(&self, object: DynamicObject) -> ClusterFuture<'_, DynamicObject> {
        Box::pin(async move {
            let mut store = self.store.lock().await;
            store.record(ClusterOp::Create)?;
            let key = store_key(&object.kind, &object.key());
            if store.objects.contains_key(&key) {
                return Err(ClusterError::AlreadyExists {
                    kind: object.kind,
                    key: key.1,
                });
            }
            let mut stored = object;
            stored.metadata.uid = Uuid::new_v4().to_string();
            stored.metadata.generation = 1;
            stored.metadata.resource_version = store.next_version();
            stored.metadata.deletion_timestamp = None;
            store.objects.insert(key, stored.clone());
            Ok(stored)
        })
    }

    fn update(&self, object: DynamicObject) -> ClusterFuture<'_, DynamicObject> {
        Box::pin(async move {
            let mut store = self.store.lock().await;
            store.record(ClusterOp::Update)?;
            let key = store_key(&object.kind, &object.key());
            let Some(current) = store.objects.get(&key).cloned() else {
                return Err(not_found(&object.kind, &key.1));
            };
            let sent = object.metadata.resource_version;
            let stored_version = current.metadata.resource_version;
            if sent != 0 && sent != stored_version {
                return Err(ClusterError::Conflict {
                    kind: object.kind,
                    key: key.1,
                    sent,
                    stored: stored_version,
                });
            }

            let mut next = current.clone();
            next.metadata.labels = object.metadata.labels;
            next.metadata.finalizers = object.metadata.finalizers;
            if next.spec != object.spec {
                next.spec = object.spec;
                next.metadata.generation += 1;
            }
            if next.metadata.is_marked_for_deletion() && next.metadata.finalizers.is_empty() {
                store.objects.remove(&key);
                return Ok(next);
            }
            next.metadata.resource_version = store.next_version();
            store.objects.insert(key, next.clone());
            Ok(next)
        })
    }

    fn patch_status(&self, object: DynamicObject) -> ClusterFuture<'_, DynamicObject> {
        Box::pin(async move {
            let mut store = self.store.lock().await;
            store.record(ClusterOp::PatchStatus)?;
            let key = store_key(&object.kind, &object.key());
            let version = store.next_version();
            let Some(current) = store.objects.get_mut(&key) else {
                return Err(not_found(&object.kind, &key.1));
            };
            current.status = object.status;
            current.metadata.resource_version = version;
            Ok(current.clone())
        })
    }

    fn delete<'a>(&'a self, kind: &'a str, key: &'a ObjectKey) -> ClusterFuture<'a, ()> {
        Box::pin(async move {
            let mut store = self.store.lock().await;
            store.record(ClusterOp::Delete)?;
            let skey = store_key(kind, key);
            let Some(current) = store.objects.get(&skey) else {
                return Err(not_found(kind, key));
            };
            if current.metadata.finalizers.is_empty() {
                store.objects.remove(&skey);
                return Ok(());
            }
            if current.metadata.is_marked_for_deletion() {
                return Ok(());
            }
            let version = store.next_version();
            if let Some(marked) = store.objects.get_mut(&skey) {
                marked.metadata.deletion_timestamp = Some(Utc::now());
                marked.metadata.resource_version = version;
            }
            Ok(())
        })
    }
}
