//! Tracking of long-running provider operations.
//!
//! A provider call that returns an operation handle stores it in
//! `status.operation_identifier` through [`track_operation`]. Subsequent
//! reconciliations run [`poll_operation`] before any other provider call:
//! while the operation is pending the pipeline stops and retries after the
//! poll interval; once it finishes the handle is cleared.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::action::{ActionFuture, BoxedAction, action};
use crate::condition::{Condition, REASON_OPERATION_FAILED, REASON_PROVIDER_ERROR};
use crate::error::{ProviderError, ReconcileError};
use crate::object::{ManagedObject, ObjectStatus, states};
use crate::outcome::Outcome;
use crate::provider::{ProviderCall, ProviderFuture};
use crate::state::ObjectState;
use crate::status::StatusPatch;

/// State of a provider operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperationState {
    /// Still running.
    Pending,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed {
        /// Provider supplied failure message.
        message: String,
    },
}

/// Queries the state of provider operations.
pub trait OperationPoller: Send + Sync {
    /// Polls one operation.
    fn poll<'a>(&'a self, operation_id: &'a str) -> ProviderFuture<'a, OperationState>;
}

/// Timing of operation polling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSettings {
    /// Delay between polls of a pending operation.
    pub interval: Duration,
    /// Delay before retrying after a failed operation.
    pub failure_delay: Duration,
}

impl PollSettings {
    /// Creates settings.
    #[must_use]
    pub const fn new(interval: Duration, failure_delay: Duration) -> Self {
        Self {
            interval,
            failure_delay,
        }
    }
}

/// Stores the handle of a started operation and stops the pipeline until
/// the next poll. A synchronously completed call continues.
pub fn track_operation<S: ObjectState>(
    state: &mut S,
    call: ProviderCall,
    interval: Duration,
) -> ActionFuture<'_> {
    Box::pin(async move {
        match call {
            ProviderCall::Completed => Outcome::Continue,
            ProviderCall::Started { operation_id } => {
                info!(key = %state.base().key(), operation = %operation_id, "tracking provider operation");
                state
                    .obj_mut()
                    .status_mut()
                    .common_mut()
                    .operation_identifier = Some(operation_id);
                StatusPatch::new()
                    .on_success(Outcome::RetryAfter(interval))
                    .run(state)
                    .await
            }
        }
    })
}

/// Polls the operation recorded on the object, if any.
///
/// `resolve` picks the poller for the object, usually from its provider.
/// Objects without a recorded operation continue untouched.
pub fn poll_operation<S, R>(resolve: R, settings: PollSettings) -> BoxedAction<S>
where
    S: ObjectState,
    R: Fn(&S) -> Result<Arc<dyn OperationPoller>, ReconcileError> + Send + Sync + 'static,
{
    action("poll_operation", move |state: &mut S| {
        let operation_id = state
            .obj()
            .status()
            .common()
            .operation_identifier
            .clone();
        let poller = operation_id.as_ref().map(|_| resolve(&*state));
        Box::pin(async move {
            let (Some(operation_id), Some(poller)) = (operation_id, poller) else {
                return Outcome::Continue;
            };
            let poller = match poller {
                Ok(poller) => poller,
                Err(err) => return Outcome::Fail(err),
            };
            match poller.poll(&operation_id).await {
                Ok(OperationState::Pending) => {
                    debug!(operation = %operation_id, "operation still pending");
                    Outcome::RetryAfter(settings.interval)
                }
                Ok(OperationState::Succeeded) => {
                    debug!(operation = %operation_id, "operation finished");
                    clear_operation(state);
                    StatusPatch::new()
                        .continue_on_success()
                        .run(state)
                        .await
                }
                Ok(OperationState::Failed { message }) => {
                    warn!(operation = %operation_id, %message, "operation failed");
                    clear_operation(state);
                    StatusPatch::new()
                        .set_condition(Condition::error(REASON_OPERATION_FAILED, message))
                        .state(states::ERROR)
                        .on_success(Outcome::RetryAfter(settings.failure_delay))
                        .run(state)
                        .await
                }
                Err(ProviderError::OperationNotFound { .. }) => {
                    warn!(operation = %operation_id, "provider no longer knows the operation");
                    clear_operation(state);
                    StatusPatch::new()
                        .continue_on_success()
                        .run(state)
                        .await
                }
                Err(err) => {
                    warn!(operation = %operation_id, error = %err, "operation poll failed");
                    StatusPatch::new()
                        .set_condition(Condition::error(REASON_PROVIDER_ERROR, err.to_string()))
                        .on_success(Outcome::RetryAfter(settings.failure_delay))
                        .run(state)
                        .await
                }
            }
        })
    })
}

fn clear_operation<S: ObjectState>(state: &mut S) {
    state
        .obj_mut()
        .status_mut()
        .common_mut()
        .operation_identifier = None;
}

#[cfg(test)]
mod tests;
