//! Error types shared across the reconciliation kernel.

use thiserror::Error;

use crate::object::ObjectKey;

/// Errors raised by a cluster client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClusterError {
    /// The addressed object does not exist.
    #[error("{kind} {key} not found")]
    NotFound {
        /// Kind of the missing object.
        kind: String,
        /// Namespace and name of the missing object.
        key: ObjectKey,
    },
    /// An object with the same key already exists.
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// Kind of the conflicting object.
        kind: String,
        /// Namespace and name of the conflicting object.
        key: ObjectKey,
    },
    /// The write was based on a stale resource version.
    #[error("{kind} {key} was modified concurrently (sent version {sent}, stored {stored})")]
    Conflict {
        /// Kind of the object.
        kind: String,
        /// Namespace and name of the object.
        key: ObjectKey,
        /// Resource version carried by the rejected write.
        sent: u64,
        /// Resource version currently stored.
        stored: u64,
    },
    /// The object could not be converted to or from its typed form.
    #[error("failed to convert {kind}: {message}")]
    Codec {
        /// Kind being converted.
        kind: String,
        /// Converter message.
        message: String,
    },
    /// The cluster could not be reached.
    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a cloud provider adapter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// The provider API rejected or failed the request.
    #[error("provider API error: {message}")]
    Api {
        /// Message reported by the provider.
        message: String,
    },
    /// No adapter is registered for the requested provider.
    #[error("provider {provider} is not supported for this resource")]
    NotSupported {
        /// Provider name.
        provider: String,
    },
    /// The provider has no record of the operation.
    #[error("operation {operation_id} not found")]
    OperationNotFound {
        /// Identifier of the missing operation.
        operation_id: String,
    },
}

/// Failure carried by [`crate::Outcome::Fail`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReconcileError {
    /// A cluster call failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    /// A provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The desired state is invalid and cannot be acted upon.
    #[error("{reason}: {message}")]
    Validation {
        /// Machine readable reason, reused as a condition reason.
        reason: String,
        /// Human readable explanation.
        message: String,
    },
    /// The registered kinds reference each other in a loop.
    #[error("kind dependency cycle involving {kinds}")]
    DependencyCycle {
        /// Kinds left unordered when the cycle was detected.
        kinds: String,
    },
    /// An object of an unregistered kind was encountered.
    #[error("kind {kind} is not registered")]
    UnknownKind {
        /// The unregistered kind.
        kind: String,
    },
    /// A referenced object does not exist.
    #[error("referenced object {key} does not exist")]
    MissingObject {
        /// Namespace and name of the missing object.
        key: ObjectKey,
    },
}

impl ReconcileError {
    /// Builds a validation error.
    pub fn validation(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Returns `true` when the error reports a missing object.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Cluster(ClusterError::NotFound { .. }))
    }
}
