//! Per-reconciliation working state.
//!
//! [`BaseState`] carries the object under reconciliation, the snapshot last
//! read from or written to the cluster, and the clusters the reconciler may
//! touch. Reconcilers that need more context embed a `BaseState` in their own
//! state type and expose it through [`ObjectState`].

use std::sync::Arc;

use tracing::debug;

use crate::action::{BoxedAction, action};
use crate::cluster::{ClusterClient, ClusterExt, ClusterSet};
use crate::error::ReconcileError;
use crate::object::{ManagedObject, ObjectKey};
use crate::outcome::Outcome;

/// Working state for one object.
pub struct BaseState<O: ManagedObject> {
    key: ObjectKey,
    object: O,
    persisted: Option<O>,
    cluster: Arc<dyn ClusterClient>,
    clusters: ClusterSet,
}

impl<O: ManagedObject> BaseState<O> {
    /// Creates state for an object held in `cluster`.
    ///
    /// The object is assumed to mirror what the cluster stores.
    pub fn new(cluster: Arc<dyn ClusterClient>, object: O) -> Self {
        Self {
            key: object.key(),
            persisted: Some(object.clone()),
            object,
            clusters: ClusterSet::new(Arc::clone(&cluster)),
            cluster,
        }
    }

    /// Loads the object by key.
    ///
    /// Returns `Ok(None)` when the object does not exist.
    ///
    /// # Errors
    ///
    /// Propagates cluster failures.
    pub async fn load(
        cluster: Arc<dyn ClusterClient>,
        key: &ObjectKey,
    ) -> Result<Option<Self>, ReconcileError> {
        let loaded: Option<O> = cluster.get_object(key).await?;
        Ok(loaded.map(|object| Self::new(cluster, object)))
    }

    /// Replaces the cluster set available to actions.
    #[must_use]
    pub fn with_clusters(mut self, clusters: ClusterSet) -> Self {
        self.clusters = clusters;
        self
    }

    /// Key of the object.
    #[must_use]
    pub const fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Working copy of the object.
    #[must_use]
    pub const fn obj(&self) -> &O {
        &self.object
    }

    /// Mutable working copy of the object.
    pub const fn obj_mut(&mut self) -> &mut O {
        &mut self.object
    }

    /// Snapshot of the object as last seen in the cluster.
    #[must_use]
    pub const fn persisted(&self) -> Option<&O> {
        self.persisted.as_ref()
    }

    /// Cluster holding the object.
    #[must_use]
    pub const fn cluster(&self) -> &Arc<dyn ClusterClient> {
        &self.cluster
    }

    /// All clusters available to the reconciler.
    #[must_use]
    pub const fn clusters(&self) -> &ClusterSet {
        &self.clusters
    }

    /// Returns `true` when the working status differs from the snapshot.
    #[must_use]
    pub fn status_changed(&self) -> bool {
        self.persisted
            .as_ref()
            .is_none_or(|persisted| persisted.status() != self.object.status())
    }

    /// Re-reads the object from the cluster.
    ///
    /// Returns `false` when the object no longer exists; the working copy is
    /// then left untouched.
    ///
    /// # Errors
    ///
    /// Propagates cluster failures.
    pub async fn load_obj(&mut self) -> Result<bool, ReconcileError> {
        let loaded: Option<O> = self.cluster.get_object(&self.key).await?;
        let Some(object) = loaded else {
            debug!(key = %self.key, "object not found");
            return Ok(false);
        };
        self.adopt(object);
        Ok(true)
    }

    /// Writes metadata and spec of the working copy.
    ///
    /// # Errors
    ///
    /// Propagates cluster failures, including version conflicts.
    pub async fn update_obj(&mut self) -> Result<(), ReconcileError> {
        let stored = self.cluster.update_object(&self.object).await?;
        self.adopt_metadata(stored);
        Ok(())
    }

    /// Writes the working status.
    ///
    /// # Errors
    ///
    /// Propagates cluster failures.
    pub async fn patch_obj_status(&mut self) -> Result<(), ReconcileError> {
        let stored = self.cluster.patch_object_status(&self.object).await?;
        self.adopt(stored);
        Ok(())
    }

    /// Adds a finalizer and persists it, returning whether it was missing.
    ///
    /// # Errors
    ///
    /// Propagates cluster failures.
    pub async fn patch_add_finalizer(&mut self, finalizer: &str) -> Result<bool, ReconcileError> {
        if !self.object.meta_mut().add_finalizer(finalizer) {
            return Ok(false);
        }
        self.update_obj().await?;
        Ok(true)
    }

    /// Removes a finalizer and persists it, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Propagates cluster failures.
    pub async fn patch_remove_finalizer(
        &mut self,
        finalizer: &str,
    ) -> Result<bool, ReconcileError> {
        if !self.object.meta_mut().remove_finalizer(finalizer) {
            return Ok(false);
        }
        self.update_obj().await?;
        Ok(true)
    }

    fn adopt(&mut self, object: O) {
        self.persisted = Some(object.clone());
        self.object = object;
    }

    /// Takes metadata and spec from the stored copy while keeping any
    /// unpersisted status edits in the working copy.
    fn adopt_metadata(&mut self, stored: O) {
        let status = self.object.status().clone();
        self.persisted = Some(stored.clone());
        self.object = stored;
        *self.object.status_mut() = status;
    }
}

/// State type that embeds a [`BaseState`].
pub trait ObjectState: Send + 'static {
    /// Object under reconciliation.
    type Object: ManagedObject;

    /// Shared working state.
    fn base(&self) -> &BaseState<Self::Object>;

    /// Mutable shared working state.
    fn base_mut(&mut self) -> &mut BaseState<Self::Object>;

    /// Working copy of the object.
    fn obj(&self) -> &Self::Object {
        self.base().obj()
    }

    /// Mutable working copy of the object.
    fn obj_mut(&mut self) -> &mut Self::Object {
        self.base_mut().obj_mut()
    }
}

impl<O: ManagedObject> ObjectState for BaseState<O> {
    type Object = O;

    fn base(&self) -> &Self {
        self
    }

    fn base_mut(&mut self) -> &mut Self {
        self
    }
}

/// Re-reads the object and forgets it when it no longer exists.
pub fn load_obj<S: ObjectState>() -> BoxedAction<S> {
    action("load_obj", |state: &mut S| {
        Box::pin(async move {
            match state.base_mut().load_obj().await {
                Ok(true) => Outcome::Continue,
                Ok(false) => Outcome::Forget,
                Err(err) => Outcome::Fail(err),
            }
        })
    })
}
