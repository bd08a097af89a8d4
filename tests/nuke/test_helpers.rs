//! Shared fixtures and helpers for Nuke BDD scenarios.

use std::future::Future;
use std::sync::Arc;

use rstest::fixture;
use stratus::nuke::NukeReconciler;
use stratus::resources::{
    IpRangeProvider, IpRangeReconciler, NfsInstanceReconciler, NfsProvider, bundled_kinds,
};
use stratus::test_support::ScriptedProvider;
use stratus::{InMemoryCluster, ProviderFactory, ProviderKind, Reconciler};
use tokio::runtime::Runtime;

pub const NUKE: &str = "nuke-a";

#[derive(Clone)]
pub struct NukeContext {
    pub cluster: InMemoryCluster,
    pub ranges: Arc<Reconciler<IpRangeReconciler>>,
    pub shares: Arc<Reconciler<NfsInstanceReconciler>>,
    pub nukes: Arc<Reconciler<NukeReconciler>>,
}

#[fixture]
pub fn nuke_context() -> NukeContext {
    let cluster = InMemoryCluster::new();
    let provider = ScriptedProvider::new();

    let range_adapter: Arc<IpRangeProvider> = Arc::new(provider.clone());
    let ranges = Reconciler::new(
        IpRangeReconciler::new(
            ProviderFactory::new().register(ProviderKind::Gcp, range_adapter),
            bundled_kinds(),
        ),
        Arc::new(cluster.clone()),
    );
    let share_adapter: Arc<dyn NfsProvider> = Arc::new(provider);
    let shares = Reconciler::new(
        NfsInstanceReconciler::new(ProviderFactory::new().register(ProviderKind::Gcp, share_adapter)),
        Arc::new(cluster.clone()),
    );
    let nukes = Reconciler::new(
        NukeReconciler::new(bundled_kinds()),
        Arc::new(cluster.clone()),
    );

    NukeContext {
        cluster,
        ranges: Arc::new(ranges),
        shares: Arc::new(shares),
        nukes: Arc::new(nukes),
    }
}

/// Drives a future to completion on a fresh runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    let runtime = Runtime::new().unwrap_or_else(|err| panic!("tokio runtime: {err}"));
    runtime.block_on(future)
}
