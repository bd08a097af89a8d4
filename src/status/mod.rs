//! Declarative status updates.
//!
//! [`StatusPatch`] collects condition and state edits, applies them to the
//! working copy, and writes the status only when it differs from the last
//! persisted snapshot. The caller chooses the outcome returned on success and
//! on write failure.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::action::ActionFuture;
use crate::condition::{Condition, HEALTH};
use crate::object::{ManagedObject, ObjectStatus};
use crate::outcome::Outcome;
use crate::state::ObjectState;

/// Builder for one status write.
#[derive(Debug)]
#[must_use]
pub struct StatusPatch {
    set: Vec<Condition>,
    remove: BTreeSet<String>,
    remove_if_reason: Vec<(String, String)>,
    keep: Vec<String>,
    state: Option<String>,
    on_success: Outcome,
    on_failure: Outcome,
    success_log: Option<String>,
    changed_log: Vec<String>,
}

impl Default for StatusPatch {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPatch {
    /// Starts an empty patch that forgets on success and retries now on
    /// write failure.
    pub fn new() -> Self {
        Self {
            set: Vec::new(),
            remove: BTreeSet::new(),
            remove_if_reason: Vec::new(),
            keep: Vec::new(),
            state: None,
            on_success: Outcome::Forget,
            on_failure: Outcome::RetryNow,
            success_log: None,
            changed_log: Vec::new(),
        }
    }

    /// Sets a condition. Members of the exclusive group other than this one
    /// are dropped unless kept.
    pub fn set_condition(mut self, condition: Condition) -> Self {
        self.set.push(condition);
        self
    }

    /// Removes conditions by type.
    pub fn remove_conditions<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.remove.extend(types.into_iter().map(Into::into));
        self
    }

    /// Removes a condition only when it carries the given reason.
    pub fn remove_condition_if_reason(
        mut self,
        condition_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.remove_if_reason
            .push((condition_type.into(), reason.into()));
        self
    }

    /// Protects condition types from exclusive-group removal.
    pub fn keep_conditions<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.keep.extend(types.into_iter().map(Into::into));
        self
    }

    /// Sets `status.state`.
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Outcome returned after a successful or unnecessary write.
    pub fn on_success(mut self, outcome: Outcome) -> Self {
        self.on_success = outcome;
        self
    }

    /// Shorthand for continuing the pipeline after the write.
    pub fn continue_on_success(self) -> Self {
        self.on_success(Outcome::Continue)
    }

    /// Outcome returned when the write fails.
    pub fn on_failure(mut self, outcome: Outcome) -> Self {
        self.on_failure = outcome;
        self
    }

    /// Message logged after a successful write.
    pub fn success_log(mut self, message: impl Into<String>) -> Self {
        self.success_log = Some(message.into());
        self
    }

    /// Message logged only when the status actually changed.
    pub fn on_status_changed(mut self, message: impl Into<String>) -> Self {
        self.changed_log.push(message.into());
        self
    }

    /// Applies the edits to a status without touching the cluster.
    pub fn apply<St: ObjectStatus>(&self, status: &mut St, generation: i64) {
        let common = status.common_mut();
        for (condition_type, reason) in &self.remove_if_reason {
            common.conditions.remove_if_reason(condition_type, reason);
        }
        for condition_type in &self.remove {
            common.conditions.remove(condition_type);
        }
        let mut keep = self.keep.clone();
        keep.extend(self.set.iter().map(|c| c.condition_type.clone()));
        for condition in &self.set {
            let mut stamped = condition.clone();
            stamped.observed_generation = generation;
            common.conditions.set_exclusive(stamped, &HEALTH, &keep);
        }
        if let Some(state) = &self.state {
            common.state = Some(state.clone());
        }
        common.observed_generation = generation;
    }

    /// Applies the edits and persists them when they changed the status.
    pub fn run<S: ObjectState>(self, state: &mut S) -> ActionFuture<'_> {
        Box::pin(async move {
            let generation = state.obj().meta().generation;
            self.apply(state.obj_mut().status_mut(), generation);

            if !state.base().status_changed() {
                return self.on_success;
            }

            let key = state.base().key().clone();
            if let Err(err) = state.base_mut().patch_obj_status().await {
                warn!(key = %key, error = %err, "failed to patch status");
                return self.on_failure;
            }

            for message in &self.changed_log {
                info!(key = %key, "{message}");
            }
            if let Some(message) = &self.success_log {
                info!(key = %key, "{message}");
            }
            self.on_success
        })
    }

    /// Returns `true` when the status was not computed for the current
    /// generation or carries no conditions yet.
    #[must_use]
    pub fn is_stale<S: ObjectState>(state: &S) -> bool {
        let object = state.obj();
        let common = object.status().common();
        common.observed_generation != object.meta().generation || common.conditions.is_empty()
    }
}
