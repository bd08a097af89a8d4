//! Reconciliation kernel for the stratus multi-cloud resource operator.
//!
//! Declarative objects stored in a control-plane cluster describe cloud
//! infrastructure. Each reconciliation loads one object, runs a pipeline of
//! composable actions against it, and maps the resulting [`Outcome`] onto a
//! scheduler [`Requeue`] decision. The crate supplies the building blocks
//! (status patching, finalizers, operation polling, dependency guards, and
//! the cascading Nuke teardown) plus reference reconcilers for the bundled
//! resource kinds.

pub mod action;
pub mod backoff;
pub mod cluster;
pub mod condition;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod guard;
pub mod kinds;
pub mod nuke;
pub mod object;
pub mod operation;
pub mod outcome;
pub mod provider;
pub mod reconciler;
pub mod resources;
pub mod state;
pub mod status;
pub mod test_support;

pub use action::{
    Action, ActionFuture, BoxedAction, Predicate, action, compose_actions, if_else, if_then,
    marked_for_deletion,
};
pub use backoff::FailureBackoff;
pub use cluster::{ClusterClient, ClusterExt, ClusterRole, ClusterSet, InMemoryCluster};
pub use condition::{Condition, ConditionGroup, ConditionSet, ConditionStatus, HEALTH};
pub use config::{ConfigError, OperatorConfig, Timings};
pub use error::{ClusterError, ProviderError, ReconcileError};
pub use guard::DependencyGuard;
pub use kinds::KindRegistry;
pub use object::{
    DynamicObject, ManagedObject, ObjectKey, ObjectMeta, ObjectRef, ObjectStatus, Resource,
    ResourceSpec, StandardStatus,
};
pub use operation::{OperationPoller, OperationState, PollSettings, poll_operation};
pub use outcome::{Outcome, Requeue};
pub use provider::{ProviderFactory, ProviderKind};
pub use reconciler::{IgnoreFilter, Reconcile, Reconciler};
pub use state::{BaseState, ObjectState};
pub use status::StatusPatch;
