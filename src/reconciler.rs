//! Entry point driving one reconciliation of one object.
//!
//! A [`Reconcile`] implementation describes a kind: how to build its working
//! state and which pipeline to run. [`Reconciler`] loads the object, runs the
//! pipeline inside a tracing span, and turns the final [`Outcome`] into a
//! [`Requeue`] decision for the work queue.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{Instrument, debug, error, info, info_span};

use crate::action::{Action as _, BoxedAction};
use crate::backoff::FailureBackoff;
use crate::cluster::{ClusterClient, ClusterSet};
use crate::object::{ManagedObject, ObjectKey, ResourceSpec};
use crate::outcome::{Outcome, Requeue};
use crate::state::{BaseState, ObjectState};

/// Kind-specific half of a reconciler.
pub trait Reconcile: Send + Sync + 'static {
    /// Working state threaded through the pipeline.
    type State: ObjectState;

    /// Wraps freshly loaded base state.
    fn new_state(&self, base: BaseState<<Self::State as ObjectState>::Object>) -> Self::State;

    /// Builds the pipeline run on every reconciliation.
    fn pipeline(&self) -> BoxedAction<Self::State>;
}

/// Objects excluded from reconciliation, keyed by kind and key.
///
/// Clones share the same set so a filter can be handed to several
/// reconcilers and updated from outside.
#[derive(Clone, Default)]
pub struct IgnoreFilter {
    ignored: Arc<RwLock<BTreeSet<(String, ObjectKey)>>>,
}

impl IgnoreFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops reconciling the object.
    pub fn ignore(&self, kind: &str, key: &ObjectKey) {
        self.ignored
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((kind.to_owned(), key.clone()));
    }

    /// Resumes reconciling the object.
    pub fn unignore(&self, kind: &str, key: &ObjectKey) {
        self.ignored
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(kind.to_owned(), key.clone()));
    }

    /// Returns `true` when the object is ignored.
    #[must_use]
    pub fn is_ignored(&self, kind: &str, key: &ObjectKey) -> bool {
        self.ignored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(kind.to_owned(), key.clone()))
    }
}

impl fmt::Debug for IgnoreFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .ignored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("IgnoreFilter").field("ignored", &count).finish()
    }
}

/// Runs a [`Reconcile`] pipeline against objects in a cluster.
pub struct Reconciler<R: Reconcile> {
    reconcile: R,
    pipeline: BoxedAction<R::State>,
    clusters: ClusterSet,
    ignore: IgnoreFilter,
    backoff: Option<Arc<FailureBackoff>>,
}

impl<R: Reconcile> Reconciler<R> {
    /// Creates a reconciler reading objects from `cluster`.
    #[must_use]
    pub fn new(reconcile: R, cluster: Arc<dyn ClusterClient>) -> Self {
        let pipeline = reconcile.pipeline();
        Self {
            reconcile,
            pipeline,
            clusters: ClusterSet::new(cluster),
            ignore: IgnoreFilter::new(),
            backoff: None,
        }
    }

    /// Replaces the clusters handed to the pipeline. The control plane of
    /// `clusters` becomes the cluster objects are read from.
    #[must_use]
    pub fn with_clusters(mut self, clusters: ClusterSet) -> Self {
        self.clusters = clusters;
        self
    }

    /// Shares an ignore filter with the reconciler.
    #[must_use]
    pub fn with_ignore_filter(mut self, ignore: IgnoreFilter) -> Self {
        self.ignore = ignore;
        self
    }

    /// Resolves failures to fixed delays from `backoff` instead of leaving
    /// the delay to the work queue.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Arc<FailureBackoff>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Ignore filter consulted before every reconciliation.
    #[must_use]
    pub const fn ignore_filter(&self) -> &IgnoreFilter {
        &self.ignore
    }

    /// Reconciles the object stored under `key`.
    pub async fn reconcile(&self, key: &ObjectKey) -> Requeue {
        let kind = <<R::State as ObjectState>::Object as ManagedObject>::Spec::KIND;
        if self.ignore.is_ignored(kind, key) {
            debug!(kind, key = %key, "object ignored");
            return Requeue::Done;
        }

        let span = info_span!("reconcile", kind, key = %key);
        let outcome = self.run_pipeline(key).instrument(span).await;
        self.schedule(kind, key, outcome)
    }

    async fn run_pipeline(&self, key: &ObjectKey) -> Outcome {
        let cluster = Arc::clone(self.clusters.control_plane());
        let base = match BaseState::load(cluster, key).await {
            Ok(Some(base)) => base,
            Ok(None) => {
                debug!("object not found");
                return Outcome::Forget;
            }
            Err(err) => return Outcome::Fail(err),
        };
        let mut state = self
            .reconcile
            .new_state(base.with_clusters(self.clusters.clone()));
        self.pipeline.run(&mut state).await
    }

    fn schedule(&self, kind: &str, key: &ObjectKey, outcome: Outcome) -> Requeue {
        match &outcome {
            Outcome::Fail(err) => error!(kind, key = %key, error = %err, "reconciliation failed"),
            Outcome::RetryAfter(delay) => {
                debug!(kind, key = %key, delay_secs = delay.as_secs(), "reconciliation requeued");
            }
            other => info!(kind, key = %key, outcome = other.label(), "reconciliation finished"),
        }

        let Some(backoff) = &self.backoff else {
            return outcome.into_requeue();
        };
        let backoff_key = format!("{kind}/{key}");
        match outcome.into_requeue() {
            Requeue::Backoff(_) => Requeue::After(backoff.when(&backoff_key)),
            requeue => {
                backoff.forget(&backoff_key);
                requeue
            }
        }
    }
}

impl<R: Reconcile + fmt::Debug> fmt::Debug for Reconciler<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("reconcile", &self.reconcile)
            .field("clusters", &self.clusters)
            .field("ignore", &self.ignore)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::action::{action, compose_actions};
    use crate::cluster::{ClusterExt, InMemoryCluster};
    use crate::error::ClusterError;
    use crate::resources::{IpRange, IpRangeSpec};
    use rstest::rstest;

    /// Pipeline returning a fixed outcome after stamping the status.
    struct Fixed(Outcome);

    impl Reconcile for Fixed {
        type State = BaseState<IpRange>;

        fn new_state(&self, base: BaseState<IpRange>) -> BaseState<IpRange> {
            base
        }

        fn pipeline(&self) -> BoxedAction<BaseState<IpRange>> {
            let outcome = self.0.clone();
            compose_actions(
                "fixed",
                [action("stamp", move |state: &mut BaseState<IpRange>| {
                    state.obj_mut().status.common.state = Some(String::from("Seen"));
                    let answer = outcome.clone();
                    Box::pin(async move { answer })
                })],
            )
        }
    }

    fn key() -> ObjectKey {
        ObjectKey::new("kcp-system", "range-a")
    }

    async fn seeded() -> InMemoryCluster {
        let cluster = InMemoryCluster::new();
        let range = IpRange::new(
            "kcp-system",
            "range-a",
            IpRangeSpec {
                scope: String::from("scope-a"),
                cidr: String::from("10.0.0.0/24"),
                network: None,
            },
        );
        cluster.create_object(&range).await.expect("range");
        cluster
    }

    #[rstest]
    #[case(Outcome::Forget, Requeue::Done)]
    #[case(Outcome::Continue, Requeue::Done)]
    #[case(Outcome::RetryNow, Requeue::Immediately)]
    #[case(
        Outcome::RetryAfter(Duration::from_secs(7)),
        Requeue::After(Duration::from_secs(7))
    )]
    #[tokio::test]
    async fn outcome_becomes_requeue(#[case] outcome: Outcome, #[case] expected: Requeue) {
        let cluster = seeded().await;
        let reconciler = Reconciler::new(Fixed(outcome), Arc::new(cluster));
        assert_eq!(reconciler.reconcile(&key()).await, expected);
    }

    #[rstest]
    #[tokio::test]
    async fn missing_object_is_done() {
        let reconciler = Reconciler::new(
            Fixed(Outcome::RetryNow),
            Arc::new(InMemoryCluster::new()),
        );
        assert_eq!(reconciler.reconcile(&key()).await, Requeue::Done);
    }

    #[rstest]
    #[tokio::test]
    async fn ignored_object_is_skipped() {
        let cluster = seeded().await;
        let reconciler = Reconciler::new(Fixed(Outcome::RetryNow), Arc::new(cluster));
        let filter = reconciler.ignore_filter().clone();

        filter.ignore("IpRange", &key());
        assert_eq!(reconciler.reconcile(&key()).await, Requeue::Done);

        filter.unignore("IpRange", &key());
        assert_eq!(reconciler.reconcile(&key()).await, Requeue::Immediately);
    }

    #[rstest]
    #[tokio::test]
    async fn failures_back_off_until_success() {
        let cluster = seeded().await;
        let failure = Outcome::fail(ClusterError::Unavailable(String::from("down")));
        let backoff = Arc::new(FailureBackoff::quick());
        let failing = Reconciler::new(Fixed(failure), Arc::new(cluster.clone()))
            .with_backoff(Arc::clone(&backoff));

        let first = failing.reconcile(&key()).await;
        let second = failing.reconcile(&key()).await;
        assert_eq!(first, Requeue::After(Duration::from_millis(100)));
        assert_eq!(second, Requeue::After(Duration::from_millis(400)));
        assert_eq!(backoff.failures("IpRange/kcp-system/range-a"), 2);

        let healthy = Reconciler::new(Fixed(Outcome::Forget), Arc::new(cluster))
            .with_backoff(Arc::clone(&backoff));
        assert_eq!(healthy.reconcile(&key()).await, Requeue::Done);
        assert_eq!(backoff.failures("IpRange/kcp-system/range-a"), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn failure_without_backoff_keeps_error() {
        let cluster = seeded().await;
        let err = ClusterError::Unavailable(String::from("down"));
        let reconciler = Reconciler::new(Fixed(Outcome::fail(err.clone())), Arc::new(cluster));
        assert_eq!(
            reconciler.reconcile(&key()).await,
            Requeue::Backoff(err.into())
        );
    }
}
