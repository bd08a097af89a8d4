//! BDD step definitions for the Nuke cascade.

use rstest_bdd_macros::{given, then, when};
use stratus::nuke::{Nuke, NukeSpec};
use stratus::resources::Scope;
use stratus::{ClusterClient as _, ClusterExt, ObjectKey};

use super::test_helpers::{NUKE, NukeContext, block_on};
use crate::fixtures::{NAMESPACE, RANGE, SCOPE, SHARE, create_scope, ip_range, nfs_instance};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn nuke_key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, NUKE)
}

fn stored_nuke(nuke_context: &NukeContext) -> Result<Nuke, StepError> {
    block_on(nuke_context.cluster.get_object(&nuke_key()))
        .map_err(|err| StepError::Assertion(format!("get Nuke: {err}")))?
        .ok_or_else(|| StepError::Assertion(String::from("Nuke does not exist")))
}

#[given("a GCP scope")]
fn gcp_scope(nuke_context: NukeContext) -> Result<NukeContext, StepError> {
    block_on(create_scope(&nuke_context.cluster)).map_err(StepError::Assertion)?;
    Ok(nuke_context)
}

#[given("an allocated IpRange with a ready NFS instance")]
fn allocated_services(nuke_context: NukeContext) -> Result<NukeContext, StepError> {
    let cluster = &nuke_context.cluster;
    block_on(cluster.create_object(&ip_range("10.181.0.0/16")))
        .map_err(|err| StepError::Assertion(format!("create IpRange: {err}")))?;
    block_on(cluster.create_object(&nfs_instance()))
        .map_err(|err| StepError::Assertion(format!("create NfsInstance: {err}")))?;

    let range = block_on(nuke_context.ranges.reconcile(&ObjectKey::new(NAMESPACE, RANGE)));
    if range.delay().is_some() {
        return Err(StepError::Assertion(format!(
            "IpRange allocation did not settle: {range:?}"
        )));
    }
    let share = block_on(nuke_context.shares.reconcile(&ObjectKey::new(NAMESPACE, SHARE)));
    if share.delay().is_some() {
        return Err(StepError::Assertion(format!(
            "NfsInstance creation did not settle: {share:?}"
        )));
    }
    Ok(nuke_context)
}

#[given("a Nuke for the scope")]
fn nuke_for_scope(nuke_context: NukeContext) -> Result<NukeContext, StepError> {
    let nuke = Nuke::new(
        NAMESPACE,
        NUKE,
        NukeSpec {
            scope: String::from(SCOPE),
        },
    );
    block_on(nuke_context.cluster.create_object(&nuke))
        .map_err(|err| StepError::Assertion(format!("create Nuke: {err}")))?;
    Ok(nuke_context)
}

#[when("the Nuke is reconciled")]
fn reconcile_nuke(nuke_context: NukeContext) -> NukeContext {
    let outcome = block_on(nuke_context.nukes.reconcile(&nuke_key()));
    tracing::debug!(?outcome, "nuke pass finished");
    nuke_context
}

#[when("the resource reconcilers process the deletions")]
fn process_deletions(nuke_context: NukeContext) -> NukeContext {
    let share = block_on(nuke_context.shares.reconcile(&ObjectKey::new(NAMESPACE, SHARE)));
    let range = block_on(nuke_context.ranges.reconcile(&ObjectKey::new(NAMESPACE, RANGE)));
    tracing::debug!(?share, ?range, "resource reconcilers finished");
    nuke_context
}

#[then("the Nuke state is \"{state}\"")]
fn nuke_state(nuke_context: &NukeContext, state: String) -> Result<(), StepError> {
    let nuke = stored_nuke(nuke_context)?;
    if nuke.status.common.state.as_deref() == Some(state.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected state {state}, got {:?}",
            nuke.status.common.state
        )))
    }
}

#[then("every scope resource is marked for deletion")]
fn scope_marked(nuke_context: &NukeContext) -> Result<(), StepError> {
    for (kind, name) in [("IpRange", RANGE), ("NfsInstance", SHARE)] {
        let object = block_on(nuke_context.cluster.get(kind, &ObjectKey::new(NAMESPACE, name)))
            .map_err(|err| StepError::Assertion(format!("get {kind}: {err}")))?
            .ok_or_else(|| StepError::Assertion(format!("{kind}/{name} vanished early")))?;
        if !object.metadata.is_marked_for_deletion() {
            return Err(StepError::Assertion(format!(
                "{kind}/{name} is not marked for deletion"
            )));
        }
    }
    Ok(())
}

#[then("the Nuke tracks {count:usize} remaining resources")]
fn remaining(nuke_context: &NukeContext, count: usize) -> Result<(), StepError> {
    let nuke = stored_nuke(nuke_context)?;
    let found = nuke.status.remaining();
    if found == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} remaining resources, got {found}"
        )))
    }
}

#[then("the scope no longer exists")]
fn scope_gone(nuke_context: &NukeContext) -> Result<(), StepError> {
    let scope: Option<Scope> =
        block_on(nuke_context.cluster.get_object(&ObjectKey::new(NAMESPACE, SCOPE)))
            .map_err(|err| StepError::Assertion(format!("get Scope: {err}")))?;
    match scope {
        None => Ok(()),
        Some(found) => Err(StepError::Assertion(format!(
            "scope still present: {:?}",
            found.metadata
        ))),
    }
}
