//! Control signals exchanged between reconciliation steps and the scheduler.

use std::time::Duration;

use crate::error::ReconcileError;

/// Instruction returned by every reconciliation step.
///
/// Only [`Outcome::Continue`] lets a composed pipeline advance to its next
/// step; every other variant ends the current reconciliation.
#[derive(Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum Outcome {
    /// Proceed to the next step.
    Continue,
    /// Desired steady state reached; wait for the next external change.
    Forget,
    /// Stop and reconcile again as soon as the scheduler permits.
    RetryNow,
    /// Stop and reconcile again no sooner than the given delay.
    RetryAfter(Duration),
    /// Stop because of a genuine failure; retried with backoff.
    Fail(ReconcileError),
}

impl Outcome {
    /// Returns `true` when the pipeline may advance.
    #[must_use]
    pub const fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Returns `true` when the outcome ends the pipeline.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !self.is_continue()
    }

    /// Wraps any error convertible into [`ReconcileError`].
    pub fn fail(err: impl Into<ReconcileError>) -> Self {
        Self::Fail(err.into())
    }

    /// Short label used in structured log fields.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Forget => "forget",
            Self::RetryNow => "retry_now",
            Self::RetryAfter(_) => "retry_after",
            Self::Fail(_) => "fail",
        }
    }

    /// Maps the outcome onto the scheduler contract.
    ///
    /// A pipeline that falls off its end with [`Outcome::Continue`] has
    /// nothing left to do, so it is treated like [`Outcome::Forget`].
    pub fn into_requeue(self) -> Requeue {
        match self {
            Self::Continue | Self::Forget => Requeue::Done,
            Self::RetryNow => Requeue::Immediately,
            Self::RetryAfter(delay) => Requeue::After(delay),
            Self::Fail(err) => Requeue::Backoff(err),
        }
    }
}

impl From<ReconcileError> for Outcome {
    fn from(value: ReconcileError) -> Self {
        Self::Fail(value)
    }
}

/// Scheduling decision handed back to the work queue after a reconciliation.
#[derive(Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum Requeue {
    /// Do not schedule again until the object changes.
    Done,
    /// Schedule again immediately.
    Immediately,
    /// Schedule again after the delay.
    After(Duration),
    /// Schedule again using the per-object failure backoff.
    Backoff(ReconcileError),
}

impl Requeue {
    /// Returns the fixed delay, when the decision carries one.
    #[must_use]
    pub const fn delay(&self) -> Option<Duration> {
        match self {
            Self::After(delay) => Some(*delay),
            Self::Done | Self::Immediately | Self::Backoff(_) => None,
        }
    }
}
