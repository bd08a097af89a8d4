//! Composable reconciliation steps.
//!
//! An [`Action`] runs against mutable state and returns an [`Outcome`].
//! Pipelines are built from plain actions with [`compose_actions`] and the
//! branching helpers [`if_else`] and [`if_then`]. A composed pipeline stops
//! at the first outcome other than [`Outcome::Continue`] and returns it
//! unchanged.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::object::ManagedObject as _;
use crate::outcome::Outcome;
use crate::state::ObjectState;

/// Future returned by [`Action::run`].
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Outcome> + Send + 'a>>;

/// One reconciliation step.
pub trait Action<S>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Runs the step.
    fn run<'a>(&'a self, state: &'a mut S) -> ActionFuture<'a>;
}

/// Shared, type-erased action.
pub type BoxedAction<S> = Arc<dyn Action<S>>;

struct FnAction<F> {
    name: String,
    body: F,
}

impl<S, F> Action<S> for FnAction<F>
where
    F: for<'a> Fn(&'a mut S) -> ActionFuture<'a> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(&'a self, state: &'a mut S) -> ActionFuture<'a> {
        (self.body)(state)
    }
}

/// Wraps a closure as a named action.
///
/// The closure receives the state and returns a boxed future, typically
/// `Box::pin(async move { .. })`.
pub fn action<S, F>(name: impl Into<String>, body: F) -> BoxedAction<S>
where
    S: 'static,
    F: for<'a> Fn(&'a mut S) -> ActionFuture<'a> + Send + Sync + 'static,
{
    Arc::new(FnAction {
        name: name.into(),
        body,
    })
}

/// Sequence of actions run in order.
pub struct ComposedAction<S> {
    name: String,
    actions: Vec<BoxedAction<S>>,
}

impl<S: Send + 'static> Action<S> for ComposedAction<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(&'a self, state: &'a mut S) -> ActionFuture<'a> {
        Box::pin(async move {
            for step in &self.actions {
                debug!(
                    action = %self.name,
                    target_action = step.name(),
                    "running action"
                );
                let outcome = step.run(&mut *state).await;
                if outcome.is_terminal() {
                    debug!(
                        action = %self.name,
                        last_action = step.name(),
                        outcome = outcome.label(),
                        "reconciliation step finished"
                    );
                    return outcome;
                }
            }
            Outcome::Continue
        })
    }
}

/// Composes actions into one that runs them in order.
///
/// An empty composition returns [`Outcome::Continue`].
pub fn compose_actions<S, I>(name: impl Into<String>, actions: I) -> BoxedAction<S>
where
    S: Send + 'static,
    I: IntoIterator<Item = BoxedAction<S>>,
{
    Arc::new(ComposedAction {
        name: name.into(),
        actions: actions.into_iter().collect(),
    })
}

/// Read-only test over state used to choose a branch.
pub trait Predicate<S>: Send + Sync {
    /// Evaluates the predicate.
    fn test(&self, state: &S) -> bool;
}

impl<S, F> Predicate<S> for F
where
    F: Fn(&S) -> bool + Send + Sync,
{
    fn test(&self, state: &S) -> bool {
        self(state)
    }
}

/// Shared, type-erased predicate.
pub type BoxedPredicate<S> = Arc<dyn Predicate<S>>;

/// Negation of a predicate.
pub struct Not<P>(P);

impl<S, P: Predicate<S>> Predicate<S> for Not<P> {
    fn test(&self, state: &S) -> bool {
        !self.0.test(state)
    }
}

/// Negates a predicate.
pub const fn not<P>(predicate: P) -> Not<P> {
    Not(predicate)
}

/// Conjunction of predicates; true when empty.
pub struct All<S>(Vec<BoxedPredicate<S>>);

impl<S> Predicate<S> for All<S> {
    fn test(&self, state: &S) -> bool {
        self.0.iter().all(|p| p.test(state))
    }
}

/// Builds a conjunction.
pub fn all<S>(predicates: impl IntoIterator<Item = BoxedPredicate<S>>) -> All<S> {
    All(predicates.into_iter().collect())
}

/// Disjunction of predicates; false when empty.
pub struct Any<S>(Vec<BoxedPredicate<S>>);

impl<S> Predicate<S> for Any<S> {
    fn test(&self, state: &S) -> bool {
        self.0.iter().any(|p| p.test(state))
    }
}

/// Builds a disjunction.
pub fn any<S>(predicates: impl IntoIterator<Item = BoxedPredicate<S>>) -> Any<S> {
    Any(predicates.into_iter().collect())
}

/// True when the object under reconciliation has a deletion timestamp.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkedForDeletion;

impl<S: ObjectState> Predicate<S> for MarkedForDeletion {
    fn test(&self, state: &S) -> bool {
        state.obj().meta().is_marked_for_deletion()
    }
}

/// Predicate selecting the deletion path.
#[must_use]
pub const fn marked_for_deletion() -> MarkedForDeletion {
    MarkedForDeletion
}

struct IfElse<S> {
    name: String,
    predicate: BoxedPredicate<S>,
    then: BoxedAction<S>,
    otherwise: Option<BoxedAction<S>>,
}

impl<S: Send + 'static> Action<S> for IfElse<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(&'a self, state: &'a mut S) -> ActionFuture<'a> {
        if self.predicate.test(state) {
            return self.then.run(state);
        }
        match &self.otherwise {
            Some(otherwise) => otherwise.run(state),
            None => Box::pin(async { Outcome::Continue }),
        }
    }
}

/// Runs `then` when the predicate holds, `otherwise` when it does not.
pub fn if_else<S, P>(predicate: P, then: BoxedAction<S>, otherwise: BoxedAction<S>) -> BoxedAction<S>
where
    S: Send + 'static,
    P: Predicate<S> + 'static,
{
    Arc::new(IfElse {
        name: format!("if_else({},{})", then.name(), otherwise.name()),
        predicate: Arc::new(predicate),
        then,
        otherwise: Some(otherwise),
    })
}

/// Runs `then` when the predicate holds and continues otherwise.
pub fn if_then<S, P>(predicate: P, then: BoxedAction<S>) -> BoxedAction<S>
where
    S: Send + 'static,
    P: Predicate<S> + 'static,
{
    Arc::new(IfElse {
        name: format!("if({})", then.name()),
        predicate: Arc::new(predicate),
        then,
        otherwise: None,
    })
}

/// Action that always returns [`Outcome::Forget`].
pub fn stop_and_forget<S: 'static>() -> BoxedAction<S> {
    action("stop_and_forget", |_| Box::pin(async { Outcome::Forget }))
}

/// Action that always returns [`Outcome::Continue`].
pub fn noop<S: 'static>() -> BoxedAction<S> {
    action("noop", |_| Box::pin(async { Outcome::Continue }))
}
