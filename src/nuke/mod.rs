//! Cascading teardown of every resource in a scope.
//!
//! A [`Nuke`] object names a scope. Each pass lists every registered kind in
//! deletion order, records the scope's objects in the Nuke status, and
//! requests deletion of anything newly discovered. Objects absent from a
//! later listing are recorded as deleted. Once nothing tracked remains the
//! Nuke turns `Completed` and releases the
//! [`Scope`](crate::resources::Scope) itself.
//!
//! The per-object dependency guard still applies while the cascade runs, so
//! a referenced object only finishes deleting after its dependents are gone.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::{
    Action, ActionFuture, BoxedAction, action, compose_actions, if_else, if_then,
    marked_for_deletion, stop_and_forget,
};
use crate::cluster::ClusterExt;
use crate::condition::Condition;
use crate::config::Timings;
use crate::error::{ClusterError, ReconcileError};
use crate::kinds::KindRegistry;
use crate::object::{ObjectKey, ObjectStatus, Resource, ResourceSpec, StandardStatus, states};
use crate::outcome::Outcome;
use crate::reconciler::Reconcile;
use crate::resources::ScopeSpec;
use crate::state::BaseState;
use crate::status::StatusPatch;

/// Desired state of a [`Nuke`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NukeSpec {
    /// Scope whose resources are torn down.
    pub scope: String,
}

impl ResourceSpec for NukeSpec {
    const KIND: &'static str = "Nuke";

    fn scope(&self) -> Option<&str> {
        Some(&self.scope)
    }
}

/// Deletion progress of one object.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum NukeObjectStatus {
    /// Seen in the scope, deletion not requested yet.
    Discovered,
    /// Deletion requested, object still present.
    Deleting,
    /// Object no longer exists.
    Deleted,
}

/// Objects of one kind tracked by a Nuke.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NukeKindStatus {
    /// Kind name.
    pub kind: String,
    /// Progress keyed by object name.
    #[serde(default)]
    pub objects: BTreeMap<String, NukeObjectStatus>,
}

impl NukeKindStatus {
    /// Creates an empty record for `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            objects: BTreeMap::new(),
        }
    }

    /// Merges a listing of live objects, keyed by name with their
    /// marked-for-deletion flag.
    ///
    /// Tracked objects missing from the listing become `Deleted`. Objects
    /// that reappear after being deleted are tracked again.
    pub fn observe(&mut self, live: &BTreeMap<String, bool>) {
        for (name, status) in &mut self.objects {
            if !live.contains_key(name) {
                *status = NukeObjectStatus::Deleted;
            }
        }
        for (name, marked) in live {
            let seen = if *marked {
                NukeObjectStatus::Deleting
            } else {
                NukeObjectStatus::Discovered
            };
            self.objects
                .entry(name.clone())
                .and_modify(|status| {
                    if *status == NukeObjectStatus::Deleted {
                        *status = seen;
                    }
                })
                .or_insert(seen);
        }
    }

    /// Names of objects still waiting for a deletion request.
    #[must_use]
    pub fn discovered(&self) -> Vec<String> {
        self.objects
            .iter()
            .filter(|(_, status)| **status == NukeObjectStatus::Discovered)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of objects not yet deleted.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.objects
            .values()
            .filter(|status| **status != NukeObjectStatus::Deleted)
            .count()
    }
}

/// Observed state of a [`Nuke`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NukeStatus {
    /// Shared status fields.
    #[serde(flatten)]
    pub common: StandardStatus,
    /// When the first pass ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialized_on: Option<DateTime<Utc>>,
    /// Per-kind progress in deletion order.
    #[serde(default)]
    pub resources: Vec<NukeKindStatus>,
}

impl NukeStatus {
    /// Record for `kind`, if any object of it was ever seen.
    #[must_use]
    pub fn kind(&self, kind: &str) -> Option<&NukeKindStatus> {
        self.resources.iter().find(|record| record.kind == kind)
    }

    /// Merges a listing of `kind`. Kinds without objects are only recorded
    /// once something of theirs was seen.
    pub fn observe(&mut self, kind: &str, live: &BTreeMap<String, bool>) {
        if let Some(record) = self.resources.iter_mut().find(|record| record.kind == kind) {
            record.observe(live);
            return;
        }
        if live.is_empty() {
            return;
        }
        let mut record = NukeKindStatus::new(kind);
        record.observe(live);
        self.resources.push(record);
    }

    /// Sets the progress of one tracked object.
    pub fn set(&mut self, kind: &str, name: &str, status: NukeObjectStatus) {
        if let Some(record) = self.resources.iter_mut().find(|record| record.kind == kind) {
            record.objects.insert(name.to_owned(), status);
        }
    }

    /// Number of tracked objects not yet deleted.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.resources.iter().map(NukeKindStatus::remaining).sum()
    }
}

impl ObjectStatus for NukeStatus {
    fn common(&self) -> &StandardStatus {
        &self.common
    }

    fn common_mut(&mut self) -> &mut StandardStatus {
        &mut self.common
    }
}

/// A [`NukeSpec`] object.
pub type Nuke = Resource<NukeSpec, NukeStatus>;

/// Working state of the Nuke reconciler.
pub type NukeState = BaseState<Nuke>;

/// Lists the scope and requests deletion of newly discovered objects.
struct Sweep {
    registry: KindRegistry,
}

impl Sweep {
    async fn discover(&self, state: &mut NukeState) -> Result<(), ReconcileError> {
        let order = self.registry.deletion_order()?;
        let namespace = state.key().namespace.clone();
        let scope = state.obj().spec.scope.clone();
        let cluster = Arc::clone(state.cluster());
        for kind in order {
            let mut live = BTreeMap::new();
            for object in cluster.list(kind, &namespace).await? {
                let facts = self.registry.facts(&object)?;
                if facts.scope.as_deref() == Some(scope.as_str()) {
                    let marked = object.metadata.is_marked_for_deletion();
                    live.insert(object.metadata.name, marked);
                }
            }
            state.obj_mut().status.observe(kind, &live);
        }
        let status = &mut state.obj_mut().status;
        if status.initialized_on.is_none() {
            status.initialized_on = Some(Utc::now());
        }
        Ok(())
    }

    async fn delete_discovered(&self, state: &mut NukeState) -> Result<(), ReconcileError> {
        let pending: Vec<(String, String)> = state
            .obj()
            .status
            .resources
            .iter()
            .flat_map(|record| {
                record
                    .discovered()
                    .into_iter()
                    .map(|name| (record.kind.clone(), name))
            })
            .collect();
        let namespace = state.key().namespace.clone();
        let scope = state.obj().spec.scope.clone();
        let cluster = Arc::clone(state.cluster());
        for (kind, name) in pending {
            let key = ObjectKey::new(namespace.clone(), name.clone());
            let progress = match cluster.delete(&kind, &key).await {
                Ok(()) => {
                    info!(nuke = %state.key(), scope = %scope, kind = %kind, object = %name, "marked for deletion");
                    NukeObjectStatus::Deleting
                }
                Err(ClusterError::NotFound { .. }) => NukeObjectStatus::Deleted,
                Err(err) => return Err(err.into()),
            };
            state.obj_mut().status.set(&kind, &name, progress);
        }
        Ok(())
    }

    async fn sweep(&self, state: &mut NukeState) -> Result<(), ReconcileError> {
        self.discover(state).await?;
        self.delete_discovered(state).await
    }
}

impl Action<NukeState> for Sweep {
    fn name(&self) -> &str {
        "sweep_scope"
    }

    fn run<'a>(&'a self, state: &'a mut NukeState) -> ActionFuture<'a> {
        Box::pin(async move {
            match self.sweep(state).await {
                Ok(()) => Outcome::Continue,
                Err(err) => Outcome::Fail(err),
            }
        })
    }
}

/// Persists progress and decides whether the scope is empty.
fn evaluate(timings: Timings) -> BoxedAction<NukeState> {
    action("evaluate_progress", move |state: &mut NukeState| {
        let remaining = state.obj().status.remaining();
        Box::pin(async move {
            if remaining > 0 {
                debug!(nuke = %state.key(), remaining, "waiting for scope resources to disappear");
                return StatusPatch::new()
                    .state(states::DELETING)
                    .on_success(Outcome::RetryAfter(timings.nuke_poll_interval))
                    .run(state)
                    .await;
            }
            StatusPatch::new()
                .set_condition(Condition::ready("all scope resources are deleted"))
                .state(states::COMPLETED)
                .on_status_changed("Nuke completed")
                .continue_on_success()
                .run(state)
                .await
        })
    })
}

/// Deletes the scope once its resources are gone.
fn release_scope() -> BoxedAction<NukeState> {
    action("release_scope", |state: &mut NukeState| {
        Box::pin(async move {
            let key = ObjectKey::new(
                state.key().namespace.clone(),
                state.obj().spec.scope.clone(),
            );
            let deleted = state.cluster().delete_object::<ScopeSpec>(&key).await;
            match deleted {
                Ok(()) => {
                    info!(nuke = %state.key(), scope = %key, "scope released");
                    Outcome::Forget
                }
                Err(ClusterError::NotFound { .. }) => Outcome::Forget,
                Err(err) => Outcome::Fail(err.into()),
            }
        })
    })
}

fn completed(state: &NukeState) -> bool {
    state.obj().status.common.state.as_deref() == Some(states::COMPLETED)
}

/// Reconciles [`Nuke`] objects.
#[derive(Clone, Debug)]
pub struct NukeReconciler {
    registry: KindRegistry,
    timings: Timings,
}

impl NukeReconciler {
    /// Creates a reconciler tearing down the kinds in `registry`.
    #[must_use]
    pub fn new(registry: KindRegistry) -> Self {
        Self {
            registry,
            timings: Timings::default(),
        }
    }

    /// Overrides the retry delays.
    #[must_use]
    pub const fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }
}

impl Reconcile for NukeReconciler {
    type State = NukeState;

    fn new_state(&self, base: BaseState<Nuke>) -> NukeState {
        base
    }

    fn pipeline(&self) -> BoxedAction<NukeState> {
        let sweep: BoxedAction<NukeState> = Arc::new(Sweep {
            registry: self.registry.clone(),
        });
        compose_actions(
            "nuke",
            [
                if_then(marked_for_deletion(), stop_and_forget()),
                if_else(
                    completed,
                    release_scope(),
                    compose_actions(
                        "nukeSweep",
                        [sweep, evaluate(self.timings), release_scope()],
                    ),
                ),
            ],
        )
    }
}
