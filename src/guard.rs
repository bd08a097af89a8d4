//! Deletion guard for objects other objects reference.
//!
//! Before a referenced object releases its provider resource, the guard
//! lists every registered kind that may reference it. Live referrers block
//! the deletion with a `Warning` condition carrying the `DeleteWhileUsed`
//! reason; once they are gone the warning is cleared and the pipeline moves
//! on.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::action::{Action, ActionFuture, BoxedAction};
use crate::cluster::ClusterClient;
use crate::condition::{CONDITION_WARNING, Condition, REASON_DELETE_WHILE_USED};
use crate::error::ReconcileError;
use crate::kinds::KindRegistry;
use crate::object::{ManagedObject, ObjectKey, ObjectRef, states};
use crate::outcome::Outcome;
use crate::state::ObjectState;
use crate::status::StatusPatch;

/// Blocks deletion while referencing objects exist.
#[derive(Clone, Debug)]
pub struct DependencyGuard {
    registry: KindRegistry,
    recheck_delay: Duration,
}

impl DependencyGuard {
    /// Creates a guard that re-checks blocked deletions after `recheck_delay`.
    #[must_use]
    pub const fn new(registry: KindRegistry, recheck_delay: Duration) -> Self {
        Self {
            registry,
            recheck_delay,
        }
    }

    /// Objects referencing `kind`/`key` in the same namespace.
    ///
    /// # Errors
    ///
    /// Propagates list failures and undecodable specs.
    pub async fn blockers(
        &self,
        cluster: &dyn ClusterClient,
        kind: &str,
        key: &ObjectKey,
    ) -> Result<Vec<ObjectRef>, ReconcileError> {
        let target = ObjectRef::new(kind, key.name.clone());
        let mut found = Vec::new();
        for dependent in self.registry.referencing_kinds(kind) {
            for object in cluster.list(dependent, &key.namespace).await? {
                let facts = self.registry.facts(&object)?;
                if facts.references.contains(&target) {
                    found.push(ObjectRef::new(dependent, object.metadata.name));
                }
            }
        }
        Ok(found)
    }

    /// Type-erased guard for use in a pipeline.
    #[must_use]
    pub fn into_action<S: ObjectState>(self) -> BoxedAction<S> {
        Arc::new(self)
    }
}

fn describe(blockers: &[ObjectRef]) -> String {
    let names: Vec<String> = blockers
        .iter()
        .map(|blocker| format!("{}/{}", blocker.kind, blocker.name))
        .collect();
    format!("deletion blocked by dependents: {}", names.join(", "))
}

impl<S: ObjectState> Action<S> for DependencyGuard {
    fn name(&self) -> &str {
        "dependency_guard"
    }

    fn run<'a>(&'a self, state: &'a mut S) -> ActionFuture<'a> {
        Box::pin(async move {
            let kind = state.obj().kind();
            let key = state.base().key().clone();
            let cluster = Arc::clone(state.base().cluster());
            let blockers = match self.blockers(cluster.as_ref(), kind, &key).await {
                Ok(blockers) => blockers,
                Err(err) => return Outcome::Fail(err),
            };

            if blockers.is_empty() {
                return StatusPatch::new()
                    .remove_condition_if_reason(CONDITION_WARNING, REASON_DELETE_WHILE_USED)
                    .continue_on_success()
                    .run(state)
                    .await;
            }

            let message = describe(&blockers);
            info!(key = %key, kind, blockers = blockers.len(), "{message}");
            StatusPatch::new()
                .set_condition(Condition::warning(REASON_DELETE_WHILE_USED, message))
                .state(states::WARNING)
                .on_success(Outcome::RetryAfter(self.recheck_delay))
                .run(state)
                .await
        })
    }
}
