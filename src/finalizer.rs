//! Finalizer actions guarding provider cleanup.

use tracing::{debug, info};

use crate::action::{BoxedAction, action};
use crate::object::ManagedObject;
use crate::outcome::Outcome;
use crate::state::ObjectState;

/// Finalizer placed on every managed object unless configured otherwise.
pub const DEFAULT_FINALIZER: &str = "cloud-control.kyma-project.io/deletion-hook";

/// Ensures the finalizer is present on objects that are not being deleted.
///
/// Continues in every case except a failed write.
pub fn add_finalizer<S: ObjectState>(finalizer: impl Into<String>) -> BoxedAction<S> {
    let finalizer = finalizer.into();
    action("add_finalizer", move |state: &mut S| {
        let name = finalizer.clone();
        Box::pin(async move {
            if state.obj().meta().is_marked_for_deletion() {
                return Outcome::Continue;
            }
            match state.base_mut().patch_add_finalizer(&name).await {
                Ok(true) => {
                    debug!(key = %state.base().key(), finalizer = %name, "finalizer added");
                    Outcome::Continue
                }
                Ok(false) => Outcome::Continue,
                Err(err) => Outcome::Fail(err),
            }
        })
    })
}

/// Removes the finalizer from an object marked for deletion.
///
/// Once the finalizer is gone the cluster may drop the object, so the
/// pipeline stops with [`Outcome::Forget`]. Objects that are not being
/// deleted, or that no longer carry the finalizer, continue untouched.
pub fn remove_finalizer<S: ObjectState>(finalizer: impl Into<String>) -> BoxedAction<S> {
    let finalizer = finalizer.into();
    action("remove_finalizer", move |state: &mut S| {
        let name = finalizer.clone();
        Box::pin(async move {
            if !state.obj().meta().is_marked_for_deletion() {
                return Outcome::Continue;
            }
            match state.base_mut().patch_remove_finalizer(&name).await {
                Ok(true) => {
                    info!(key = %state.base().key(), finalizer = %name, "finalizer removed");
                    Outcome::Forget
                }
                Ok(false) => Outcome::Continue,
                Err(err) => Outcome::Fail(err),
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::action::Action as _;
    use crate::cluster::{ClusterClient as _, ClusterExt, ClusterOp, InMemoryCluster};
    use crate::resources::{IpRange, IpRangeSpec};
    use crate::state::BaseState;
    use rstest::rstest;

    async fn stored(cluster: &InMemoryCluster, finalizer: Option<&str>) -> BaseState<IpRange> {
        let mut range = IpRange::new(
            "kcp-system",
            "range-a",
            IpRangeSpec {
                scope: String::from("scope-a"),
                cidr: String::from("10.0.0.0/24"),
                network: None,
            },
        );
        if let Some(name) = finalizer {
            range = range.with_finalizer(name);
        }
        let stored = cluster.create_object(&range).await.expect("create");
        BaseState::new(Arc::new(cluster.clone()), stored)
    }

    #[rstest]
    #[tokio::test]
    async fn adding_twice_writes_once() {
        let cluster = InMemoryCluster::new();
        let mut state = stored(&cluster, None).await;
        let add = add_finalizer::<BaseState<IpRange>>(DEFAULT_FINALIZER);

        assert_eq!(add.run(&mut state).await, Outcome::Continue);
        assert_eq!(add.run(&mut state).await, Outcome::Continue);
        assert_eq!(cluster.calls(ClusterOp::Update).await, 1);
        assert!(state.obj().metadata.has_finalizer(DEFAULT_FINALIZER));
    }

    #[rstest]
    #[tokio::test]
    async fn removal_only_happens_during_deletion() {
        let cluster = InMemoryCluster::new();
        let mut state = stored(&cluster, Some(DEFAULT_FINALIZER)).await;
        let remove = remove_finalizer::<BaseState<IpRange>>(DEFAULT_FINALIZER);

        assert_eq!(remove.run(&mut state).await, Outcome::Continue);
        assert!(state.obj().metadata.has_finalizer(DEFAULT_FINALIZER));

        cluster
            .delete("IpRange", state.key())
            .await
            .expect("delete");
        assert!(state.load_obj().await.expect("reload"));
        assert_eq!(remove.run(&mut state).await, Outcome::Forget);
        assert_eq!(cluster.count("IpRange").await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn no_finalizer_added_while_deleting() {
        let cluster = InMemoryCluster::new();
        let mut state = stored(&cluster, Some("other")).await;
        cluster
            .delete("IpRange", state.key())
            .await
            .expect("delete");
        assert!(state.load_obj().await.expect("reload"));

        let add = add_finalizer::<BaseState<IpRange>>(DEFAULT_FINALIZER);
        assert_eq!(add.run(&mut state).await, Outcome::Continue);
        assert!(!state.obj().metadata.has_finalizer(DEFAULT_FINALIZER));
    }
}
