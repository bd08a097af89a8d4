//! Managed object model: metadata, typed resources, and their dynamic form.
//!
//! Typed objects are [`Resource`] values parameterised by a spec and status.
//! Cluster clients traffic in [`DynamicObject`], whose spec and status are
//! raw JSON; [`ManagedObject`] converts between the two.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::ConditionSet;
use crate::error::ClusterError;

/// Well-known values of `status.state`.
pub mod states {
    /// Desired state reached.
    pub const READY: &str = "Ready";
    /// Reconciliation failed.
    pub const ERROR: &str = "Error";
    /// Non-fatal problem, such as deletion blocked by dependents.
    pub const WARNING: &str = "Warning";
    /// Work in progress.
    pub const PROCESSING: &str = "Processing";
    /// Provider resource is being created.
    pub const CREATING: &str = "Creating";
    /// Provider resource is being changed to match the spec.
    pub const UPDATING: &str = "Updating";
    /// Provider resource is being removed.
    pub const DELETING: &str = "Deleting";
    /// Terminal state of a Nuke teardown.
    pub const COMPLETED: &str = "Completed";
}

/// Namespace and name of an object.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ObjectKey {
    /// Namespace holding the object.
    pub namespace: String,
    /// Object name, unique per kind within the namespace.
    pub name: String,
}

impl ObjectKey {
    /// Creates a key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference from one object to another in the same namespace.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ObjectRef {
    /// Kind of the referenced object.
    pub kind: String,
    /// Name of the referenced object.
    pub name: String,
}

impl ObjectRef {
    /// Creates a reference.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Cluster-maintained object metadata.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name.
    pub name: String,
    /// Object namespace.
    pub namespace: String,
    /// Unique identifier assigned on creation.
    #[serde(default)]
    pub uid: String,
    /// Incremented by the cluster on every spec change.
    #[serde(default)]
    pub generation: i64,
    /// Incremented by the cluster on every write.
    #[serde(default)]
    pub resource_version: u64,
    /// Free-form labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Markers that block physical removal while present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// Set when deletion was requested and finalizers still remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Creates metadata for a new object.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Key of the object.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Returns `true` once deletion has been requested.
    #[must_use]
    pub const fn is_marked_for_deletion(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Returns `true` when the finalizer is present.
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds the finalizer and reports whether it was missing.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_owned());
        true
    }

    /// Removes the finalizer and reports whether it was present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }
}

/// Status fields shared by every managed kind.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardStatus {
    /// Coarse lifecycle state, see [`states`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Typed observations.
    #[serde(default)]
    pub conditions: ConditionSet,
    /// Generation the status was last computed against.
    #[serde(default)]
    pub observed_generation: i64,
    /// Identifier of an in-flight provider operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_identifier: Option<String>,
}

/// Access to the [`StandardStatus`] embedded in a kind's status.
pub trait ObjectStatus:
    Clone + fmt::Debug + Default + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Shared status fields.
    fn common(&self) -> &StandardStatus;

    /// Mutable shared status fields.
    fn common_mut(&mut self) -> &mut StandardStatus;
}

impl ObjectStatus for StandardStatus {
    fn common(&self) -> &StandardStatus {
        self
    }

    fn common_mut(&mut self) -> &mut StandardStatus {
        self
    }
}

/// Desired state of a managed kind.
pub trait ResourceSpec:
    Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Kind name as stored in the cluster.
    const KIND: &'static str;

    /// Kinds this kind may reference by name.
    const REFERENCED_KINDS: &'static [&'static str] = &[];

    /// Scope the object belongs to, for scoped kinds.
    fn scope(&self) -> Option<&str> {
        None
    }

    /// Objects referenced by this spec.
    fn references(&self) -> Vec<ObjectRef> {
        Vec::new()
    }
}

/// Object the kernel can reconcile.
pub trait ManagedObject: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Desired state type.
    type Spec: ResourceSpec;
    /// Observed state type.
    type Status: ObjectStatus;

    /// Metadata.
    fn meta(&self) -> &ObjectMeta;
    /// Mutable metadata.
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    /// Desired state.
    fn spec(&self) -> &Self::Spec;
    /// Observed state.
    fn status(&self) -> &Self::Status;
    /// Mutable observed state.
    fn status_mut(&mut self) -> &mut Self::Status;

    /// Converts into the untyped cluster form.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Codec`] when serialization fails.
    fn to_dynamic(&self) -> Result<DynamicObject, ClusterError>;

    /// Converts from the untyped cluster form.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Codec`] when the kind differs or the payload
    /// does not match the typed shape.
    fn from_dynamic(object: DynamicObject) -> Result<Self, ClusterError>;

    /// Kind name.
    fn kind(&self) -> &'static str {
        Self::Spec::KIND
    }

    /// Key of the object.
    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

/// Typed managed object.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Resource<S, St> {
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: S,
    /// Observed state.
    pub status: St,
}

impl<S, St> Resource<S, St>
where
    S: ResourceSpec,
    St: ObjectStatus,
{
    /// Creates an object with an empty status.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: S) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: St::default(),
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    /// Adds a finalizer.
    #[must_use]
    pub fn with_finalizer(mut self, finalizer: &str) -> Self {
        self.metadata.add_finalizer(finalizer);
        self
    }
}

fn codec_error(kind: &str, err: &serde_json::Error) -> ClusterError {
    ClusterError::Codec {
        kind: kind.to_owned(),
        message: err.to_string(),
    }
}

impl<S, St> ManagedObject for Resource<S, St>
where
    S: ResourceSpec,
    St: ObjectStatus,
{
    type Spec = S;
    type Status = St;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &S {
        &self.spec
    }

    fn status(&self) -> &St {
        &self.status
    }

    fn status_mut(&mut self) -> &mut St {
        &mut self.status
    }

    fn to_dynamic(&self) -> Result<DynamicObject, ClusterError> {
        Ok(DynamicObject {
            kind: S::KIND.to_owned(),
            metadata: self.metadata.clone(),
            spec: serde_json::to_value(&self.spec).map_err(|err| codec_error(S::KIND, &err))?,
            status: serde_json::to_value(&self.status)
                .map_err(|err| codec_error(S::KIND, &err))?,
        })
    }

    fn from_dynamic(object: DynamicObject) -> Result<Self, ClusterError> {
        if object.kind != S::KIND {
            return Err(ClusterError::Codec {
                kind: S::KIND.to_owned(),
                message: format!("expected kind {}, got {}", S::KIND, object.kind),
            });
        }
        let spec = serde_json::from_value(object.spec).map_err(|err| codec_error(S::KIND, &err))?;
        let status = if object.status.is_null() {
            St::default()
        } else {
            serde_json::from_value(object.status).map_err(|err| codec_error(S::KIND, &err))?
        };
        Ok(Self {
            metadata: object.metadata,
            spec,
            status,
        })
    }
}

/// Untyped object as stored by a cluster.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DynamicObject {
    /// Kind name.
    pub kind: String,
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Desired state as JSON.
    pub spec: Value,
    /// Observed state as JSON.
    #[serde(default)]
    pub status: Value,
}

impl DynamicObject {
    /// Key of the object.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{IpRange, IpRangeSpec};
    use rstest::rstest;

    #[rstest]
    fn finalizers_are_added_once_and_removed_once() {
        let mut meta = ObjectMeta::new("kcp-system", "a");
        assert!(meta.add_finalizer("f"));
        assert!(!meta.add_finalizer("f"));
        assert_eq!(meta.finalizers, vec!["f"]);
        assert!(meta.remove_finalizer("f"));
        assert!(!meta.remove_finalizer("f"));
    }

    #[rstest]
    fn dynamic_conversion_preserves_typed_fields() {
        let range = IpRange::new(
            "kcp-system",
            "range-a",
            IpRangeSpec {
                scope: String::from("scope-a"),
                cidr: String::from("10.0.0.0/24"),
                network: None,
            },
        );
        let dynamic = range.to_dynamic().unwrap_or_else(|err| panic!("encode: {err}"));
        assert_eq!(dynamic.kind, "IpRange");
        assert_eq!(dynamic.spec["cidr"], "10.0.0.0/24");

        let back = IpRange::from_dynamic(dynamic).unwrap_or_else(|err| panic!("decode: {err}"));
        assert_eq!(back, range);
    }

    #[rstest]
    fn decoding_rejects_foreign_kind() {
        let dynamic = DynamicObject {
            kind: String::from("Subnet"),
            metadata: ObjectMeta::new("kcp-system", "x"),
            spec: Value::Null,
            status: Value::Null,
        };
        let err = IpRange::from_dynamic(dynamic).expect_err("kind mismatch");
        assert!(matches!(err, ClusterError::Codec { .. }), "{err}");
    }

    #[rstest]
    fn key_renders_namespace_and_name() {
        assert_eq!(ObjectKey::new("ns", "n").to_string(), "ns/n");
    }
}
