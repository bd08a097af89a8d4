//! Provider abstraction: capability traits and a per-provider factory.
//!
//! Each cloud exposes the operations a kind needs through small capability
//! traits. A [`ProviderFactory`] maps [`ProviderKind`] to an implementation
//! so reconcilers select the adapter at runtime from the object's scope.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Future returned by provider calls.
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Supported clouds.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Amazon Web Services.
    Aws,
    /// Microsoft Azure.
    Azure,
    /// Google Cloud.
    Gcp,
    /// OpenStack-based clouds.
    #[serde(rename = "openstack")]
    OpenStack,
}

impl ProviderKind {
    /// Lowercase provider name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::OpenStack => "openstack",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            "gcp" => Ok(Self::Gcp),
            "openstack" => Ok(Self::OpenStack),
            other => Err(ProviderError::NotSupported {
                provider: other.to_owned(),
            }),
        }
    }
}

/// Result of a provider mutation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProviderCall {
    /// The provider accepted the request and runs it asynchronously.
    Started {
        /// Identifier to poll.
        operation_id: String,
    },
    /// The request finished synchronously.
    Completed,
}

/// Creates the provider resource backing an object.
pub trait CreateResource<O>: Send + Sync {
    /// Starts creation.
    fn create<'a>(&'a self, object: &'a O) -> ProviderFuture<'a, ProviderCall>;
}

/// Brings the provider resource in line with a changed spec.
pub trait UpdateResource<O>: Send + Sync {
    /// Returns `true` when the provider resource differs from the spec.
    fn needs_update(&self, object: &O) -> bool;

    /// Starts the update.
    fn update<'a>(&'a self, object: &'a O) -> ProviderFuture<'a, ProviderCall>;
}

/// Deletes the provider resource backing an object.
pub trait DeleteResource<O>: Send + Sync {
    /// Starts deletion.
    fn delete<'a>(&'a self, object: &'a O) -> ProviderFuture<'a, ProviderCall>;
}

/// Registry of implementations keyed by provider.
pub struct ProviderFactory<T: ?Sized> {
    entries: BTreeMap<ProviderKind, Arc<T>>,
}

impl<T: ?Sized> Default for ProviderFactory<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: ?Sized> Clone for ProviderFactory<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for ProviderFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("providers", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T: ?Sized> ProviderFactory<T> {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an implementation, replacing any previous one.
    #[must_use]
    pub fn register(mut self, kind: ProviderKind, implementation: Arc<T>) -> Self {
        self.entries.insert(kind, implementation);
        self
    }

    /// Selects the implementation for a provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotSupported`] when nothing is registered.
    pub fn select(&self, kind: ProviderKind) -> Result<Arc<T>, ProviderError> {
        self.entries
            .get(&kind)
            .cloned()
            .ok_or_else(|| ProviderError::NotSupported {
                provider: kind.to_string(),
            })
    }
}
