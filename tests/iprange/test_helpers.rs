//! Shared fixtures and helpers for IpRange BDD scenarios.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use rstest::fixture;
use stratus::resources::{
    IpRangeProvider, IpRangeReconciler, NfsInstanceReconciler, NfsProvider, bundled_kinds,
};
use stratus::test_support::ScriptedProvider;
use stratus::{InMemoryCluster, ProviderFactory, ProviderKind, Reconciler, Requeue};
use tokio::runtime::Runtime;

#[derive(Clone)]
pub struct OperatorContext {
    pub cluster: InMemoryCluster,
    pub provider: ScriptedProvider,
    pub ranges: Arc<Reconciler<IpRangeReconciler>>,
    pub shares: Arc<Reconciler<NfsInstanceReconciler>>,
    pub last_outcome: Arc<Mutex<Option<Requeue>>>,
}

impl OperatorContext {
    pub fn record(&self, outcome: Requeue) {
        *self
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }

    pub fn last_outcome(&self) -> Option<Requeue> {
        self.last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[fixture]
pub fn operator_context() -> OperatorContext {
    let cluster = InMemoryCluster::new();
    let provider = ScriptedProvider::new();

    let range_adapter: Arc<IpRangeProvider> = Arc::new(provider.clone());
    let range_providers = ProviderFactory::new().register(ProviderKind::Gcp, range_adapter);
    let ranges = Reconciler::new(
        IpRangeReconciler::new(range_providers, bundled_kinds()),
        Arc::new(cluster.clone()),
    );

    let share_adapter: Arc<dyn NfsProvider> = Arc::new(provider.clone());
    let share_providers = ProviderFactory::new().register(ProviderKind::Gcp, share_adapter);
    let shares = Reconciler::new(
        NfsInstanceReconciler::new(share_providers),
        Arc::new(cluster.clone()),
    );

    OperatorContext {
        cluster,
        provider,
        ranges: Arc::new(ranges),
        shares: Arc::new(shares),
        last_outcome: Arc::new(Mutex::new(None)),
    }
}

/// Drives a future to completion on a fresh runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    let runtime = Runtime::new().unwrap_or_else(|err| panic!("tokio runtime: {err}"));
    runtime.block_on(future)
}
