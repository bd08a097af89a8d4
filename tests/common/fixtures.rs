//! Objects shared by the behavioural suites.

use stratus::resources::{IpRange, IpRangeSpec, NfsInstance, NfsInstanceSpec, Scope, ScopeSpec};
use stratus::{ClusterExt, InMemoryCluster, ProviderKind};

pub const NAMESPACE: &str = "kcp-system";
pub const SCOPE: &str = "scope-a";
pub const RANGE: &str = "range-a";
pub const SHARE: &str = "nfs-a";

pub async fn create_scope(cluster: &InMemoryCluster) -> Result<Scope, String> {
    let scope = Scope::new(
        NAMESPACE,
        SCOPE,
        ScopeSpec {
            provider: ProviderKind::Gcp,
            region: String::from("europe-west1"),
            account: String::from("project-1"),
        },
    );
    cluster
        .create_object(&scope)
        .await
        .map_err(|err| format!("create scope: {err}"))
}

pub fn ip_range(cidr: &str) -> IpRange {
    IpRange::new(
        NAMESPACE,
        RANGE,
        IpRangeSpec {
            scope: String::from(SCOPE),
            cidr: cidr.to_owned(),
            network: None,
        },
    )
}

pub fn nfs_instance() -> NfsInstance {
    NfsInstance::new(
        NAMESPACE,
        SHARE,
        NfsInstanceSpec {
            scope: String::from(SCOPE),
            ip_range: String::from(RANGE),
            capacity_gb: 1024,
        },
    )
}
