//! Test doubles shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::cluster::{ClusterExt, InMemoryCluster};
use crate::error::{ClusterError, ProviderError};
use crate::object::ManagedObject;
use crate::operation::{OperationPoller, OperationState};
use crate::provider::{CreateResource, DeleteResource, ProviderCall, ProviderFuture, UpdateResource};

/// Records a single call made through [`ScriptedProvider`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProviderInvocation {
    /// `create`, `update`, `delete`, or `poll`.
    pub method: &'static str,
    /// Object key for mutations, operation id for polls.
    pub target: String,
}

#[derive(Debug, Default)]
struct Script {
    creates: VecDeque<Result<ProviderCall, ProviderError>>,
    updates: VecDeque<Result<ProviderCall, ProviderError>>,
    drifted: bool,
    deletes: VecDeque<Result<ProviderCall, ProviderError>>,
    polls: VecDeque<Result<OperationState, ProviderError>>,
    invocations: Vec<ProviderInvocation>,
}

/// Provider double that answers from FIFO queues.
///
/// Empty queues answer with a synchronously completed call for mutations
/// and [`OperationState::Succeeded`] for polls. Clones share the script.
#[derive(Clone, Debug, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
}

impl ScriptedProvider {
    /// Creates a provider with empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the answer for the next `create`.
    pub fn push_create(&self, answer: Result<ProviderCall, ProviderError>) {
        self.lock().creates.push_back(answer);
    }

    /// Queues the answer for the next `update`.
    pub fn push_update(&self, answer: Result<ProviderCall, ProviderError>) {
        self.lock().updates.push_back(answer);
    }

    /// Makes `needs_update` report drift until the next `update`.
    pub fn set_drifted(&self, drifted: bool) {
        self.lock().drifted = drifted;
    }

    /// Queues the answer for the next `delete`.
    pub fn push_delete(&self, answer: Result<ProviderCall, ProviderError>) {
        self.lock().deletes.push_back(answer);
    }

    /// Queues the answer for the next `poll`.
    pub fn push_poll(&self, answer: Result<OperationState, ProviderError>) {
        self.lock().polls.push_back(answer);
    }

    /// Snapshot of all calls so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<ProviderInvocation> {
        self.lock().invocations.clone()
    }

    /// Number of calls made to `method`.
    #[must_use]
    pub fn count(&self, method: &str) -> usize {
        self.lock()
            .invocations
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    fn record(&self, method: &'static str, target: String) -> MutexGuard<'_, Script> {
        let mut script = self.lock();
        script.invocations.push(ProviderInvocation { method, target });
        script
    }
}

impl<O: ManagedObject> CreateResource<O> for ScriptedProvider {
    fn create<'a>(&'a self, object: &'a O) -> ProviderFuture<'a, ProviderCall> {
        let answer = self
            .record("create", object.key().to_string())
            .creates
            .pop_front()
            .unwrap_or(Ok(ProviderCall::Completed));
        Box::pin(async move { answer })
    }
}

impl<O: ManagedObject> UpdateResource<O> for ScriptedProvider {
    fn needs_update(&self, _object: &O) -> bool {
        self.lock().drifted
    }

    fn update<'a>(&'a self, object: &'a O) -> ProviderFuture<'a, ProviderCall> {
        let mut script = self.record("update", object.key().to_string());
        script.drifted = false;
        let answer = script.updates.pop_front().unwrap_or(Ok(ProviderCall::Completed));
        drop(script);
        Box::pin(async move { answer })
    }
}

impl<O: ManagedObject> DeleteResource<O> for ScriptedProvider {
    fn delete<'a>(&'a self, object: &'a O) -> ProviderFuture<'a, ProviderCall> {
        let answer = self
            .record("delete", object.key().to_string())
            .deletes
            .pop_front()
            .unwrap_or(Ok(ProviderCall::Completed));
        Box::pin(async move { answer })
    }
}

impl OperationPoller for ScriptedProvider {
    fn poll<'a>(&'a self, operation_id: &'a str) -> ProviderFuture<'a, OperationState> {
        let answer = self
            .record("poll", operation_id.to_owned())
            .polls
            .pop_front()
            .unwrap_or(Ok(OperationState::Succeeded));
        Box::pin(async move { answer })
    }
}

/// Stores an object and returns the cluster's copy.
///
/// # Errors
///
/// Propagates the cluster's create error.
pub async fn seed<O: ManagedObject>(cluster: &InMemoryCluster, object: &O) -> Result<O, ClusterError> {
    cluster.create_object(object).await
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Holds [`ENV_LOCK`] and restores overridden variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets `STRATUS_*` style variables while holding the lock.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: every mutation happens while `ENV_LOCK` is held.
            unsafe { env::set_var(key, value) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: `_guard` still holds `ENV_LOCK`.
            unsafe {
                match old {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
