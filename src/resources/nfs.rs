//! NfsInstance reconciler.
//!
//! Waits for the referenced [`IpRange`] to become ready, creates the share,
//! and resizes it when the requested capacity changes or the provider
//! reports drift.

use tracing::debug;

use crate::action::{BoxedAction, action, compose_actions, if_else, marked_for_deletion};
use crate::cluster::ClusterExt;
use crate::condition::{CONDITION_READY, Condition, REASON_DEPENDENCY_NOT_FOUND};
use crate::config::Timings;
use crate::error::ReconcileError;
use crate::finalizer::{DEFAULT_FINALIZER, add_finalizer, remove_finalizer};
use crate::object::{ObjectKey, states};
use crate::operation::track_operation;
use crate::outcome::Outcome;
use crate::provider::{ProviderFactory, UpdateResource};
use crate::reconciler::Reconcile;
use crate::resources::provision::{
    ProvisionState, ResourceProvider, load_scope, mark_ready, poll_provider_operation,
    provider_create, provider_delete, provider_failed, reject_spec, select_provider,
};
use crate::resources::{IpRange, NfsInstance};
use crate::state::{BaseState, ObjectState};
use crate::status::StatusPatch;

/// Adapter able to create, resize, and delete NFS shares.
pub trait NfsProvider: ResourceProvider<NfsInstance> + UpdateResource<NfsInstance> {}

impl<T> NfsProvider for T where T: ResourceProvider<NfsInstance> + UpdateResource<NfsInstance> {}

/// Working state of the NfsInstance reconciler.
pub type NfsInstanceState = ProvisionState<NfsInstance, dyn NfsProvider>;

const MIN_CAPACITY_GB: u32 = 1024;
const MAX_CAPACITY_GB: u32 = 65_536;

/// Reconciles [`NfsInstance`] objects.
#[derive(Clone, Debug)]
pub struct NfsInstanceReconciler {
    providers: ProviderFactory<dyn NfsProvider>,
    timings: Timings,
    finalizer: String,
}

impl NfsInstanceReconciler {
    /// Creates a reconciler selecting adapters from `providers`.
    #[must_use]
    pub fn new(providers: ProviderFactory<dyn NfsProvider>) -> Self {
        Self {
            providers,
            timings: Timings::default(),
            finalizer: DEFAULT_FINALIZER.to_owned(),
        }
    }

    /// Overrides the retry delays.
    #[must_use]
    pub const fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Overrides the finalizer name.
    #[must_use]
    pub fn with_finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.finalizer = finalizer.into();
        self
    }
}

fn validate_capacity(capacity_gb: u32) -> Result<(), ReconcileError> {
    if (MIN_CAPACITY_GB..=MAX_CAPACITY_GB).contains(&capacity_gb) {
        return Ok(());
    }
    Err(ReconcileError::validation(
        "InvalidCapacity",
        format!("capacity {capacity_gb} GiB is outside {MIN_CAPACITY_GB}..={MAX_CAPACITY_GB} GiB"),
    ))
}

fn validate_spec() -> BoxedAction<NfsInstanceState> {
    action("validate_capacity", |state: &mut NfsInstanceState| {
        let checked = validate_capacity(state.obj().spec.capacity_gb);
        Box::pin(async move {
            match checked {
                Ok(()) => Outcome::Continue,
                Err(err) => reject_spec(state, &err).await,
            }
        })
    })
}

/// Holds the share back until its address range is allocated.
fn wait_for_ip_range(timings: Timings) -> BoxedAction<NfsInstanceState> {
    action("wait_for_ip_range", move |state: &mut NfsInstanceState| {
        Box::pin(async move {
            let key = ObjectKey::new(
                state.base().key().namespace.clone(),
                state.obj().spec.ip_range.clone(),
            );
            let loaded = state.base().cluster().get_object::<IpRange>(&key).await;
            match loaded {
                Ok(Some(range)) if range.status.common.conditions.is_true(CONDITION_READY) => {
                    Outcome::Continue
                }
                Ok(Some(_)) => {
                    debug!(key = %state.base().key(), ip_range = %key, "ip range not ready yet");
                    Outcome::RetryAfter(timings.dependency_recheck_delay)
                }
                Ok(None) => {
                    StatusPatch::new()
                        .set_condition(Condition::error(
                            REASON_DEPENDENCY_NOT_FOUND,
                            format!("IpRange {} does not exist", key.name),
                        ))
                        .state(states::ERROR)
                        .on_success(Outcome::RetryAfter(timings.dependency_recheck_delay))
                        .run(state)
                        .await
                }
                Err(err) => Outcome::Fail(err.into()),
            }
        })
    })
}

fn provisioned(share: &NfsInstance) -> bool {
    share.status.capacity_gb.is_some()
}

fn record_capacity(share: &mut NfsInstance) {
    share.status.capacity_gb = Some(share.spec.capacity_gb);
}

/// Resizes a provisioned share whose capacity or provider state drifted.
fn provider_update(timings: Timings) -> BoxedAction<NfsInstanceState> {
    action("provider_update", move |state: &mut NfsInstanceState| {
        Box::pin(async move {
            if !provisioned(state.obj()) || state.state_is(states::UPDATING) {
                return Outcome::Continue;
            }
            let Some(provider) = state.provider().cloned() else {
                return Outcome::Continue;
            };
            let share = state.obj();
            let resized = share.status.capacity_gb != Some(share.spec.capacity_gb);
            if !resized && !provider.needs_update(share) {
                return Outcome::Continue;
            }
            let called = provider.update(state.obj()).await;
            match called {
                Ok(call) => {
                    state.obj_mut().status.common.state = Some(states::UPDATING.to_owned());
                    track_operation(state, call, timings.operation_poll_interval).await
                }
                Err(err) => provider_failed(state, &err, timings).await,
            }
        })
    })
}

impl Reconcile for NfsInstanceReconciler {
    type State = NfsInstanceState;

    fn new_state(&self, base: BaseState<NfsInstance>) -> NfsInstanceState {
        ProvisionState::new(base)
    }

    fn pipeline(&self) -> BoxedAction<NfsInstanceState> {
        let timings = self.timings;
        compose_actions(
            "nfsInstance",
            [
                load_scope(timings),
                select_provider(self.providers.clone()),
                add_finalizer(self.finalizer.clone()),
                poll_provider_operation(timings),
                if_else(
                    marked_for_deletion(),
                    compose_actions(
                        "nfsInstanceDelete",
                        [
                            provider_delete(timings),
                            remove_finalizer(self.finalizer.clone()),
                        ],
                    ),
                    compose_actions(
                        "nfsInstanceCreate",
                        [
                            validate_spec(),
                            wait_for_ip_range(timings),
                            provider_create(timings, provisioned),
                            provider_update(timings),
                            mark_ready("NFS instance is ready", record_capacity),
                        ],
                    ),
                ),
            ],
        )
    }
}
