//! IpRange reconciler.
//!
//! Allocates the requested range with the scope's provider, records the
//! allocated range in status, and on deletion waits for every referencing
//! service to disappear before releasing it.

use ipnet::Ipv4Net;

use crate::action::{BoxedAction, action, compose_actions, if_else, marked_for_deletion};
use crate::config::Timings;
use crate::error::ReconcileError;
use crate::finalizer::{DEFAULT_FINALIZER, add_finalizer, remove_finalizer};
use crate::guard::DependencyGuard;
use crate::kinds::KindRegistry;
use crate::outcome::Outcome;
use crate::provider::ProviderFactory;
use crate::reconciler::Reconcile;
use crate::resources::IpRange;
use crate::resources::provision::{
    ProvisionState, ResourceProvider, load_scope, mark_ready, poll_provider_operation,
    provider_create, provider_delete, reject_spec, select_provider,
};
use crate::state::{BaseState, ObjectState};

/// Adapter for IpRange provider calls.
pub type IpRangeProvider = dyn ResourceProvider<IpRange>;

/// Working state of the IpRange reconciler.
pub type IpRangeState = ProvisionState<IpRange, IpRangeProvider>;

const MAX_PREFIX_LEN: u8 = 30;

/// Reconciles [`IpRange`] objects.
#[derive(Clone, Debug)]
pub struct IpRangeReconciler {
    providers: ProviderFactory<IpRangeProvider>,
    registry: KindRegistry,
    timings: Timings,
    finalizer: String,
}

impl IpRangeReconciler {
    /// Creates a reconciler using `registry` to find referencing objects.
    #[must_use]
    pub fn new(providers: ProviderFactory<IpRangeProvider>, registry: KindRegistry) -> Self {
        Self {
            providers,
            registry,
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

/// Checks that the range is a network address with room for hosts.
fn validate_cidr(cidr: &str) -> Result<Ipv4Net, ReconcileError> {
    let net: Ipv4Net = cidr.parse().map_err(|_| {
        ReconcileError::validation("InvalidCidr", format!("{cidr} is not an IPv4 CIDR"))
    })?;
    if net.prefix_len() > MAX_PREFIX_LEN {
        return Err(ReconcileError::validation(
            "InvalidCidr",
            format!("{cidr} is smaller than /{MAX_PREFIX_LEN}"),
        ));
    }
    if net.trunc() != net {
        return Err(ReconcileError::validation(
            "InvalidCidr",
            format!("{cidr} has host bits set, expected {}", net.trunc()),
        ));
    }
    Ok(net)
}

/// An allocated range keeps its CIDR for the life of the object.
fn check_unchanged(range: &IpRange) -> Result<(), ReconcileError> {
    match range.status.cidr.as_deref() {
        Some(allocated) if allocated != range.spec.cidr => Err(ReconcileError::validation(
            "CidrCanNotChange",
            format!(
                "range is allocated as {allocated}, cannot change to {}",
                range.spec.cidr
            ),
        )),
        _ => Ok(()),
    }
}

fn validate_spec() -> BoxedAction<IpRangeState> {
    action("validate_cidr", |state: &mut IpRangeState| {
        let checked = check_unchanged(state.obj())
            .and_then(|()| validate_cidr(&state.obj().spec.cidr).map(|_| ()));
        Box::pin(async move {
            match checked {
                Ok(()) => Outcome::Continue,
                Err(err) => reject_spec(state, &err).await,
            }
        })
    })
}

fn allocated(range: &IpRange) -> bool {
    range.status.cidr.is_some()
}

fn record_allocation(range: &mut IpRange) {
    range.status.cidr = Some(range.spec.cidr.clone());
}

impl Reconcile for IpRangeReconciler {
    type State = IpRangeState;

    fn new_state(&self, base: BaseState<IpRange>) -> IpRangeState {
        ProvisionState::new(base)
    }

    fn pipeline(&self) -> BoxedAction<IpRangeState> {
        let timings = self.timings;
        let guard = DependencyGuard::new(self.registry.clone(), timings.dependency_recheck_delay);
        compose_actions(
            "ipRange",
            [
                load_scope(timings),
                select_provider(self.providers.clone()),
                add_finalizer(self.finalizer.clone()),
                poll_provider_operation(timings),
                if_else(
                    marked_for_deletion(),
                    compose_actions(
                        "ipRangeDelete",
                        [
                            guard.into_action(),
                            provider_delete(timings),
                            remove_finalizer(self.finalizer.clone()),
                        ],
                    ),
                    compose_actions(
                        "ipRangeCreate",
                        [
                            validate_spec(),
                            provider_create(timings, allocated),
                            mark_ready("IpRange is allocated", record_allocation),
                        ],
                    ),
                ),
            ],
        )
    }
}
