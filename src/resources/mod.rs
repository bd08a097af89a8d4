//! Bundled resource kinds and their reference reconcilers.
//!
//! Every kind except [`Scope`] names the scope it belongs to and may
//! reference other kinds in the same namespace by name. The references feed
//! the [`KindRegistry`] that orders Nuke teardown and drives the dependency
//! guard.

mod iprange;
mod nfs;
mod provision;

use serde::{Deserialize, Serialize};

use crate::kinds::KindRegistry;
use crate::object::{ObjectRef, ObjectStatus, Resource, ResourceSpec, StandardStatus};
use crate::provider::ProviderKind;

pub use iprange::{IpRangeProvider, IpRangeReconciler, IpRangeState};
pub use nfs::{NfsInstanceReconciler, NfsInstanceState, NfsProvider};
pub use provision::{ProvisionState, ResourceProvider};

/// Root object anchoring a managed cluster's resources to a cloud account.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpec {
    /// Cloud hosting the resources.
    pub provider: ProviderKind,
    /// Provider region.
    pub region: String,
    /// Account, subscription, or project identifier.
    pub account: String,
}

impl ResourceSpec for ScopeSpec {
    const KIND: &'static str = "Scope";
}

/// A [`ScopeSpec`] object.
pub type Scope = Resource<ScopeSpec, StandardStatus>;

/// Virtual network owned by a scope.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Owning scope.
    pub scope: String,
    /// Address space of the network.
    pub cidr: String,
}

impl ResourceSpec for NetworkSpec {
    const KIND: &'static str = "Network";

    fn scope(&self) -> Option<&str> {
        Some(&self.scope)
    }
}

/// A [`NetworkSpec`] object.
pub type Network = Resource<NetworkSpec, StandardStatus>;

/// Address range reserved for managed services.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRangeSpec {
    /// Owning scope.
    pub scope: String,
    /// Requested range in CIDR notation.
    pub cidr: String,
    /// Network the range is carved from, when not the scope default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl ResourceSpec for IpRangeSpec {
    const KIND: &'static str = "IpRange";
    const REFERENCED_KINDS: &'static [&'static str] = &["Network"];

    fn scope(&self) -> Option<&str> {
        Some(&self.scope)
    }

    fn references(&self) -> Vec<ObjectRef> {
        self.network
            .iter()
            .map(|network| ObjectRef::new("Network", network.clone()))
            .collect()
    }
}

/// Observed state of an [`IpRange`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRangeStatus {
    /// Shared status fields.
    #[serde(flatten)]
    pub common: StandardStatus,
    /// Range actually allocated by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
}

impl ObjectStatus for IpRangeStatus {
    fn common(&self) -> &StandardStatus {
        &self.common
    }

    fn common_mut(&mut self) -> &mut StandardStatus {
        &mut self.common
    }
}

/// An [`IpRangeSpec`] object.
pub type IpRange = Resource<IpRangeSpec, IpRangeStatus>;

/// Subnet of a [`Network`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// Owning scope.
    pub scope: String,
    /// Parent network.
    pub network: String,
    /// Subnet range in CIDR notation.
    pub cidr: String,
}

impl ResourceSpec for SubnetSpec {
    const KIND: &'static str = "Subnet";
    const REFERENCED_KINDS: &'static [&'static str] = &["Network"];

    fn scope(&self) -> Option<&str> {
        Some(&self.scope)
    }

    fn references(&self) -> Vec<ObjectRef> {
        vec![ObjectRef::new("Network", self.network.clone())]
    }
}

/// A [`SubnetSpec`] object.
pub type Subnet = Resource<SubnetSpec, StandardStatus>;

/// Managed NFS file share placed in an [`IpRange`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NfsInstanceSpec {
    /// Owning scope.
    pub scope: String,
    /// Address range the share is reachable from.
    pub ip_range: String,
    /// Provisioned capacity in GiB.
    pub capacity_gb: u32,
}

impl ResourceSpec for NfsInstanceSpec {
    const KIND: &'static str = "NfsInstance";
    const REFERENCED_KINDS: &'static [&'static str] = &["IpRange"];

    fn scope(&self) -> Option<&str> {
        Some(&self.scope)
    }

    fn references(&self) -> Vec<ObjectRef> {
        vec![ObjectRef::new("IpRange", self.ip_range.clone())]
    }
}

/// Observed state of an [`NfsInstance`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NfsInstanceStatus {
    /// Shared status fields.
    #[serde(flatten)]
    pub common: StandardStatus,
    /// Capacity last applied to the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_gb: Option<u32>,
}

impl ObjectStatus for NfsInstanceStatus {
    fn common(&self) -> &StandardStatus {
        &self.common
    }

    fn common_mut(&mut self) -> &mut StandardStatus {
        &mut self.common
    }
}

/// An [`NfsInstanceSpec`] object.
pub type NfsInstance = Resource<NfsInstanceSpec, NfsInstanceStatus>;

/// Managed single-node Redis placed in an [`IpRange`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisInstanceSpec {
    /// Owning scope.
    pub scope: String,
    /// Address range the instance is reachable from.
    pub ip_range: String,
    /// Memory size in GiB.
    pub memory_size_gb: u32,
}

impl ResourceSpec for RedisInstanceSpec {
    const KIND: &'static str = "RedisInstance";
    const REFERENCED_KINDS: &'static [&'static str] = &["IpRange"];

    fn scope(&self) -> Option<&str> {
        Some(&self.scope)
    }

    fn references(&self) -> Vec<ObjectRef> {
        vec![ObjectRef::new("IpRange", self.ip_range.clone())]
    }
}

/// A [`RedisInstanceSpec`] object.
pub type RedisInstance = Resource<RedisInstanceSpec, StandardStatus>;

/// Managed sharded Redis placed in a [`Subnet`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterSpec {
    /// Owning scope.
    pub scope: String,
    /// Subnet hosting the shards.
    pub subnet: String,
    /// Number of shards.
    pub shard_count: u32,
}

impl ResourceSpec for RedisClusterSpec {
    const KIND: &'static str = "RedisCluster";
    const REFERENCED_KINDS: &'static [&'static str] = &["Subnet"];

    fn scope(&self) -> Option<&str> {
        Some(&self.scope)
    }

    fn references(&self) -> Vec<ObjectRef> {
        vec![ObjectRef::new("Subnet", self.subnet.clone())]
    }
}

/// A [`RedisClusterSpec`] object.
pub type RedisCluster = Resource<RedisClusterSpec, StandardStatus>;

/// Credentials for a second cloud account, used by cross-account peerings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// Owning scope.
    pub scope: String,
    /// Cloud of the account.
    pub provider: ProviderKind,
    /// Secret holding the credentials.
    pub secret_name: String,
}

impl ResourceSpec for SubscriptionSpec {
    const KIND: &'static str = "Subscription";

    fn scope(&self) -> Option<&str> {
        Some(&self.scope)
    }
}

/// A [`SubscriptionSpec`] object.
pub type Subscription = Resource<SubscriptionSpec, StandardStatus>;

/// Peering between a scope network and a remote network.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcPeeringSpec {
    /// Owning scope.
    pub scope: String,
    /// Local network.
    pub network: String,
    /// Provider identifier of the remote network.
    pub remote_network_id: String,
    /// Subscription holding the remote account credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

impl ResourceSpec for VpcPeeringSpec {
    const KIND: &'static str = "VpcPeering";
    const REFERENCED_KINDS: &'static [&'static str] = &["Network", "Subscription"];

    fn scope(&self) -> Option<&str> {
        Some(&self.scope)
    }

    fn references(&self) -> Vec<ObjectRef> {
        let mut refs = vec![ObjectRef::new("Network", self.network.clone())];
        if let Some(subscription) = &self.subscription {
            refs.push(ObjectRef::new("Subscription", subscription.clone()));
        }
        refs
    }
}

/// A [`VpcPeeringSpec`] object.
pub type VpcPeering = Resource<VpcPeeringSpec, StandardStatus>;

/// Registry of every scoped kind bundled with the crate.
///
/// [`Scope`] and Nuke objects are not scoped resources and are left out.
#[must_use]
pub fn bundled_kinds() -> KindRegistry {
    KindRegistry::new()
        .register::<NetworkSpec>()
        .register::<IpRangeSpec>()
        .register::<SubnetSpec>()
        .register::<NfsInstanceSpec>()
        .register::<RedisInstanceSpec>()
        .register::<RedisClusterSpec>()
        .register::<SubscriptionSpec>()
        .register::<VpcPeeringSpec>()
}
