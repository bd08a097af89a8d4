//! Cluster access abstraction.
//!
//! A [`ClusterClient`] stores [`DynamicObject`] values keyed by kind,
//! namespace, and name. [`ClusterExt`] layers typed helpers on top so
//! reconcilers work with [`ManagedObject`] values. Reconcilers may talk to up
//! to three clusters, grouped in a [`ClusterSet`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ClusterError;
use crate::object::{DynamicObject, ManagedObject, ObjectKey, ResourceSpec};

mod memory;

pub use memory::{ClusterOp, InMemoryCluster};

/// Future returned by cluster operations.
pub type ClusterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClusterError>> + Send + 'a>>;

/// Object store backing a cluster.
///
/// Writes follow the usual control-plane rules: deleting an object that
/// still carries finalizers only stamps its deletion timestamp, and the
/// object disappears once an update leaves it without finalizers.
pub trait ClusterClient: Send + Sync {
    /// Reads one object, returning `None` when it does not exist.
    fn get<'a>(&'a self, kind: &'a str, key: &'a ObjectKey)
    -> ClusterFuture<'a, Option<DynamicObject>>;

    /// Lists objects of a kind in a namespace, ordered by name.
    fn list<'a>(&'a self, kind: &'a str, namespace: &'a str)
    -> ClusterFuture<'a, Vec<DynamicObject>>;

    /// Creates an object.
    fn create(&self, object: DynamicObject) -> ClusterFuture<'_, DynamicObject>;

    /// Replaces metadata and spec; the stored status is kept.
    fn update(&self, object: DynamicObject) -> ClusterFuture<'_, DynamicObject>;

    /// Replaces the status only.
    fn patch_status(&self, object: DynamicObject) -> ClusterFuture<'_, DynamicObject>;

    /// Requests deletion.
    fn delete<'a>(&'a self, kind: &'a str, key: &'a ObjectKey) -> ClusterFuture<'a, ()>;
}

/// Typed helpers over any [`ClusterClient`].
pub trait ClusterExt: ClusterClient {
    /// Reads a typed object.
    fn get_object<'a, O: ManagedObject>(&'a self, key: &'a ObjectKey) -> ClusterFuture<'a, Option<O>> {
        Box::pin(async move {
            match self.get(O::Spec::KIND, key).await? {
                Some(object) => O::from_dynamic(object).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Lists typed objects in a namespace.
    fn list_objects<'a, O: ManagedObject>(&'a self, namespace: &'a str) -> ClusterFuture<'a, Vec<O>> {
        Box::pin(async move {
            self.list(O::Spec::KIND, namespace)
                .await?
                .into_iter()
                .map(O::from_dynamic)
                .collect()
        })
    }

    /// Creates a typed object and returns the stored copy.
    fn create_object<'a, O: ManagedObject>(&'a self, object: &'a O) -> ClusterFuture<'a, O> {
        Box::pin(async move {
            let stored = self.create(object.to_dynamic()?).await?;
            O::from_dynamic(stored)
        })
    }

    /// Updates metadata and spec of a typed object.
    fn update_object<'a, O: ManagedObject>(&'a self, object: &'a O) -> ClusterFuture<'a, O> {
        Box::pin(async move {
            let stored = self.update(object.to_dynamic()?).await?;
            O::from_dynamic(stored)
        })
    }

    /// Replaces the status of a typed object.
    fn patch_object_status<'a, O: ManagedObject>(&'a self, object: &'a O) -> ClusterFuture<'a, O> {
        Box::pin(async move {
            let stored = self.patch_status(object.to_dynamic()?).await?;
            O::from_dynamic(stored)
        })
    }

    /// Requests deletion of a typed object.
    fn delete_object<'a, S: ResourceSpec>(&'a self, key: &'a ObjectKey) -> ClusterFuture<'a, ()> {
        self.delete(S::KIND, key)
    }
}

impl<C: ClusterClient + ?Sized> ClusterExt for C {}

/// Role a cluster plays for a reconciler.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ClusterRole {
    /// Cluster holding the operator's own objects.
    ControlPlane,
    /// Cluster whose workloads consume the provisioned resources.
    Governed,
    /// Cluster used to discover fleet-level inventory.
    Fleet,
}

impl fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ControlPlane => "control-plane",
            Self::Governed => "governed",
            Self::Fleet => "fleet",
        })
    }
}

/// Clusters available to a reconciler.
#[derive(Clone)]
pub struct ClusterSet {
    control_plane: Arc<dyn ClusterClient>,
    governed: Option<Arc<dyn ClusterClient>>,
    fleet: Option<Arc<dyn ClusterClient>>,
}

impl ClusterSet {
    /// Creates a set with only the control-plane cluster.
    pub fn new(control_plane: Arc<dyn ClusterClient>) -> Self {
        Self {
            control_plane,
            governed: None,
            fleet: None,
        }
    }

    /// Adds the governed cluster.
    #[must_use]
    pub fn with_governed(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.governed = Some(cluster);
        self
    }

    /// Adds the fleet cluster.
    #[must_use]
    pub fn with_fleet(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.fleet = Some(cluster);
        self
    }

    /// Control-plane cluster.
    #[must_use]
    pub fn control_plane(&self) -> &Arc<dyn ClusterClient> {
        &self.control_plane
    }

    /// Cluster for the role, when configured.
    #[must_use]
    pub fn get(&self, role: ClusterRole) -> Option<&Arc<dyn ClusterClient>> {
        match role {
            ClusterRole::ControlPlane => Some(&self.control_plane),
            ClusterRole::Governed => self.governed.as_ref(),
            ClusterRole::Fleet => self.fleet.as_ref(),
        }
    }

    /// Cluster for the role.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Unavailable`] when the role is not configured.
    pub fn require(&self, role: ClusterRole) -> Result<&Arc<dyn ClusterClient>, ClusterError> {
        self.get(role)
            .ok_or_else(|| ClusterError::Unavailable(format!("no {role} cluster configured")))
    }
}

impl fmt::Debug for ClusterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSet")
            .field("governed", &self.governed.is_some())
            .field("fleet", &self.fleet.is_some())
            .finish_non_exhaustive()
    }
}
