//! Steps shared by reconcilers that provision one provider resource per
//! object.
//!
//! The object names a [`Scope`]; the scope's provider picks the adapter from
//! a [`ProviderFactory`]. Create and delete calls go through the adapter and
//! their long-running operations are tracked on the object's status.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::action::{ActionFuture, BoxedAction, action, compose_actions};
use crate::cluster::ClusterExt;
use crate::condition::{
    Condition, REASON_INVALID_SPEC, REASON_PROVIDER_ERROR, REASON_SCOPE_NOT_FOUND,
};
use crate::config::Timings;
use crate::error::{ProviderError, ReconcileError};
use crate::object::{ManagedObject, ObjectKey, ObjectStatus, ResourceSpec, states};
use crate::operation::{OperationPoller, OperationState, poll_operation, track_operation};
use crate::outcome::Outcome;
use crate::provider::{CreateResource, DeleteResource, ProviderFactory, ProviderFuture};
use crate::resources::Scope;
use crate::state::{BaseState, ObjectState};
use crate::status::StatusPatch;

/// Adapter able to create, delete, and poll the provider resource of `O`.
pub trait ResourceProvider<O>: CreateResource<O> + DeleteResource<O> + OperationPoller {}

impl<O, T> ResourceProvider<O> for T where T: CreateResource<O> + DeleteResource<O> + OperationPoller
{}

/// Working state of a provisioning reconciler.
pub struct ProvisionState<O: ManagedObject, P: ?Sized + 'static> {
    base: BaseState<O>,
    scope: Option<Scope>,
    provider: Option<Arc<P>>,
}

impl<O, P> ProvisionState<O, P>
where
    O: ManagedObject,
    P: ?Sized + Send + Sync + 'static,
{
    /// Wraps freshly loaded base state.
    #[must_use]
    pub const fn new(base: BaseState<O>) -> Self {
        Self {
            base,
            scope: None,
            provider: None,
        }
    }

    /// Scope loaded for the object, if it exists.
    #[must_use]
    pub const fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// Adapter selected from the scope's provider.
    #[must_use]
    pub const fn provider(&self) -> Option<&Arc<P>> {
        self.provider.as_ref()
    }

    pub(crate) fn state_is(&self, expected: &str) -> bool {
        self.base.obj().status().common().state.as_deref() == Some(expected)
    }
}

impl<O, P> ObjectState for ProvisionState<O, P>
where
    O: ManagedObject,
    P: ?Sized + Send + Sync + 'static,
{
    type Object = O;

    fn base(&self) -> &BaseState<O> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseState<O> {
        &mut self.base
    }
}

/// Loads the scope named by the object's spec.
///
/// A missing scope is an error for live objects. Objects being deleted carry
/// on without a provider so their finalizer can still be released.
pub(crate) fn load_scope<O, P>(timings: Timings) -> BoxedAction<ProvisionState<O, P>>
where
    O: ManagedObject,
    P: ?Sized + Send + Sync + 'static,
{
    action("load_scope", move |state: &mut ProvisionState<O, P>| {
        Box::pin(async move {
            let Some(scope_name) = state.obj().spec().scope().map(str::to_owned) else {
                return Outcome::Continue;
            };
            let key = ObjectKey::new(state.base.key().namespace.clone(), scope_name);
            let loaded = state.base.cluster().get_object::<Scope>(&key).await;
            match loaded {
                Ok(Some(scope)) => {
                    state.scope = Some(scope);
                    Outcome::Continue
                }
                Ok(None) if state.obj().meta().is_marked_for_deletion() => {
                    debug!(key = %state.base.key(), scope = %key, "scope already gone");
                    Outcome::Continue
                }
                Ok(None) => {
                    StatusPatch::new()
                        .set_condition(Condition::error(
                            REASON_SCOPE_NOT_FOUND,
                            format!("scope {} does not exist", key.name),
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

/// Picks the adapter for the scope's provider.
///
/// An unsupported provider cannot be fixed by retrying, so the object is
/// marked failed and forgotten until its spec changes.
pub(crate) fn select_provider<O, P>(factory: ProviderFactory<P>) -> BoxedAction<ProvisionState<O, P>>
where
    O: ManagedObject,
    P: ?Sized + Send + Sync + 'static,
{
    action("select_provider", move |state: &mut ProvisionState<O, P>| {
        let selected = state
            .scope
            .as_ref()
            .map(|scope| factory.select(scope.spec.provider));
        Box::pin(async move {
            match selected {
                None => Outcome::Continue,
                Some(Ok(provider)) => {
                    state.provider = Some(provider);
                    Outcome::Continue
                }
                Some(Err(err)) => {
                    warn!(key = %state.base.key(), error = %err, "provider not supported");
                    reject_spec(state, &ReconcileError::from(err)).await
                }
            }
        })
    })
}

/// Records a static spec problem and stops without retrying.
pub(crate) fn reject_spec<'a, S: ObjectState>(
    state: &'a mut S,
    err: &ReconcileError,
) -> ActionFuture<'a> {
    let reason = match err {
        ReconcileError::Validation { reason, .. } => reason.clone(),
        _ => REASON_INVALID_SPEC.to_owned(),
    };
    StatusPatch::new()
        .set_condition(Condition::error(reason, err.to_string()))
        .state(states::ERROR)
        .on_success(Outcome::Forget)
        .run(state)
}

/// Records a provider failure and retries after the failure delay.
pub(crate) fn provider_failed<'a, S: ObjectState>(
    state: &'a mut S,
    err: &ProviderError,
    timings: Timings,
) -> ActionFuture<'a> {
    warn!(key = %state.base().key(), error = %err, "provider call failed");
    StatusPatch::new()
        .set_condition(Condition::error(REASON_PROVIDER_ERROR, err.to_string()))
        .state(states::ERROR)
        .on_success(Outcome::RetryAfter(timings.provider_failure_delay))
        .run(state)
}

struct ProviderPoller<P: ?Sized>(Arc<P>);

impl<P: OperationPoller + ?Sized> OperationPoller for ProviderPoller<P> {
    fn poll<'a>(&'a self, operation_id: &'a str) -> ProviderFuture<'a, OperationState> {
        self.0.poll(operation_id)
    }
}

/// Drops the operation handle of an object being deleted whose scope is
/// already gone, since no adapter is left to poll it.
fn abandon_orphaned_operation<O, P>() -> BoxedAction<ProvisionState<O, P>>
where
    O: ManagedObject,
    P: ?Sized + Send + Sync + 'static,
{
    action("abandon_orphaned_operation", |state: &mut ProvisionState<O, P>| {
        let orphaned = state.provider.is_none()
            && state.obj().meta().is_marked_for_deletion()
            && state.obj().status().common().operation_identifier.is_some();
        Box::pin(async move {
            if orphaned {
                debug!(key = %state.base.key(), "scope gone, dropping tracked operation");
                state.obj_mut().status_mut().common_mut().operation_identifier = None;
            }
            Outcome::Continue
        })
    })
}

/// Polls the operation recorded on the object through the selected adapter.
pub(crate) fn poll_provider_operation<O, P>(timings: Timings) -> BoxedAction<ProvisionState<O, P>>
where
    O: ManagedObject,
    P: ResourceProvider<O> + ?Sized + 'static,
{
    let poll = poll_operation(
        |state: &ProvisionState<O, P>| {
            let provider = state.provider.as_ref().ok_or_else(|| {
                ReconcileError::MissingObject {
                    key: ObjectKey::new(
                        state.base.key().namespace.clone(),
                        state.obj().spec().scope().unwrap_or_default(),
                    ),
                }
            })?;
            let poller: Arc<dyn OperationPoller> = Arc::new(ProviderPoller(Arc::clone(provider)));
            Ok(poller)
        },
        timings.poll_settings(),
    );
    compose_actions(
        "pollProviderOperation",
        [abandon_orphaned_operation(), poll],
    )
}

/// Creates the provider resource unless `provisioned` reports it exists or
/// a creation is already under way.
pub(crate) fn provider_create<O, P>(
    timings: Timings,
    provisioned: fn(&O) -> bool,
) -> BoxedAction<ProvisionState<O, P>>
where
    O: ManagedObject,
    P: ResourceProvider<O> + ?Sized + 'static,
{
    action("provider_create", move |state: &mut ProvisionState<O, P>| {
        Box::pin(async move {
            if provisioned(state.obj()) || state.state_is(states::CREATING) {
                return Outcome::Continue;
            }
            let Some(provider) = state.provider.clone() else {
                return Outcome::Continue;
            };
            let called = CreateResource::create(provider.as_ref(), state.base.obj()).await;
            match called {
                Ok(call) => {
                    state.obj_mut().status_mut().common_mut().state =
                        Some(states::CREATING.to_owned());
                    track_operation(state, call, timings.operation_poll_interval).await
                }
                Err(err) => provider_failed(state, &err, timings).await,
            }
        })
    })
}

/// Deletes the provider resource once, then lets the pipeline continue to
/// finalizer removal after the deletion finished.
pub(crate) fn provider_delete<O, P>(timings: Timings) -> BoxedAction<ProvisionState<O, P>>
where
    O: ManagedObject,
    P: ResourceProvider<O> + ?Sized + 'static,
{
    action("provider_delete", move |state: &mut ProvisionState<O, P>| {
        Box::pin(async move {
            if state.state_is(states::DELETING) {
                return Outcome::Continue;
            }
            let Some(provider) = state.provider.clone() else {
                debug!(key = %state.base.key(), "no provider selected, skipping provider cleanup");
                return Outcome::Continue;
            };
            let called = DeleteResource::delete(provider.as_ref(), state.base.obj()).await;
            match called {
                Ok(call) => {
                    state.obj_mut().status_mut().common_mut().state =
                        Some(states::DELETING.to_owned());
                    track_operation(state, call, timings.operation_poll_interval).await
                }
                Err(err) => provider_failed(state, &err, timings).await,
            }
        })
    })
}

/// Fills provider-derived status fields and reports the object ready.
pub(crate) fn mark_ready<O, P>(
    message: &'static str,
    fill: fn(&mut O),
) -> BoxedAction<ProvisionState<O, P>>
where
    O: ManagedObject,
    P: ?Sized + Send + Sync + 'static,
{
    action("mark_ready", move |state: &mut ProvisionState<O, P>| {
        Box::pin(async move {
            fill(state.obj_mut());
            StatusPatch::new()
                .set_condition(Condition::ready(message))
                .state(states::READY)
                .on_status_changed(format!("{} ready", O::Spec::KIND))
                .run(state)
                .await
        })
    })
}
