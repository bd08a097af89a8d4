//! BDD step definitions for the IpRange lifecycle.

use rstest_bdd_macros::{given, then, when};
use stratus::condition::{CONDITION_ERROR, CONDITION_READY, CONDITION_WARNING};
use stratus::object::states;
use stratus::resources::{IpRange, NfsInstance};
use stratus::{ClusterClient as _, ClusterExt, ObjectKey};

use super::test_helpers::{OperatorContext, block_on};
use crate::fixtures::{NAMESPACE, RANGE, SHARE, create_scope, ip_range, nfs_instance};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn range_key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, RANGE)
}

fn share_key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, SHARE)
}

fn stored_range(operator_context: &OperatorContext) -> Result<IpRange, StepError> {
    block_on(operator_context.cluster.get_object(&range_key()))
        .map_err(|err| StepError::Assertion(format!("get IpRange: {err}")))?
        .ok_or_else(|| StepError::Assertion(String::from("IpRange does not exist")))
}

fn condition_reason(range: &IpRange, condition_type: &str) -> Option<String> {
    range
        .status
        .common
        .conditions
        .find(condition_type)
        .map(|condition| condition.reason.clone())
}

#[given("a GCP scope")]
fn gcp_scope(operator_context: OperatorContext) -> Result<OperatorContext, StepError> {
    block_on(create_scope(&operator_context.cluster)).map_err(StepError::Assertion)?;
    Ok(operator_context)
}

#[given("an IpRange with cidr \"{cidr}\"")]
fn range_with_cidr(
    operator_context: OperatorContext,
    cidr: String,
) -> Result<OperatorContext, StepError> {
    block_on(operator_context.cluster.create_object(&ip_range(cidr.trim())))
        .map_err(|err| StepError::Assertion(format!("create IpRange: {err}")))?;
    Ok(operator_context)
}

#[given("the IpRange is allocated")]
fn range_allocated(operator_context: OperatorContext) -> Result<OperatorContext, StepError> {
    let outcome = block_on(operator_context.ranges.reconcile(&range_key()));
    operator_context.record(outcome);
    let range = stored_range(&operator_context)?;
    if !range.status.common.conditions.is_true(CONDITION_READY) {
        return Err(StepError::Assertion(format!(
            "IpRange not ready after allocation: {:?}",
            range.status
        )));
    }
    Ok(operator_context)
}

#[given("a ready NFS instance using the IpRange")]
fn ready_share(operator_context: OperatorContext) -> Result<OperatorContext, StepError> {
    block_on(operator_context.cluster.create_object(&nfs_instance()))
        .map_err(|err| StepError::Assertion(format!("create NfsInstance: {err}")))?;
    let outcome = block_on(operator_context.shares.reconcile(&share_key()));
    operator_context.record(outcome);
    let share: NfsInstance = block_on(operator_context.cluster.get_object(&share_key()))
        .map_err(|err| StepError::Assertion(format!("get NfsInstance: {err}")))?
        .ok_or_else(|| StepError::Assertion(String::from("NfsInstance does not exist")))?;
    if share.status.common.state.as_deref() != Some(states::READY) {
        return Err(StepError::Assertion(format!(
            "NfsInstance not ready: {:?}",
            share.status
        )));
    }
    Ok(operator_context)
}

#[when("the IpRange is reconciled")]
fn reconcile_range(operator_context: OperatorContext) -> OperatorContext {
    let outcome = block_on(operator_context.ranges.reconcile(&range_key()));
    operator_context.record(outcome);
    operator_context
}

#[when("the IpRange is deleted")]
fn delete_range(operator_context: OperatorContext) -> Result<OperatorContext, StepError> {
    block_on(operator_context.cluster.delete("IpRange", &range_key()))
        .map_err(|err| StepError::Assertion(format!("delete IpRange: {err}")))?;
    let outcome = block_on(operator_context.ranges.reconcile(&range_key()));
    operator_context.record(outcome);
    Ok(operator_context)
}

#[when("the NFS instance is deleted")]
fn delete_share(operator_context: OperatorContext) -> Result<OperatorContext, StepError> {
    block_on(operator_context.cluster.delete("NfsInstance", &share_key()))
        .map_err(|err| StepError::Assertion(format!("delete NfsInstance: {err}")))?;
    let outcome = block_on(operator_context.shares.reconcile(&share_key()));
    operator_context.record(outcome);
    Ok(operator_context)
}

#[then("the IpRange status cidr is \"{cidr}\"")]
fn status_cidr(operator_context: &OperatorContext, cidr: String) -> Result<(), StepError> {
    let range = stored_range(operator_context)?;
    if range.status.cidr.as_deref() == Some(cidr.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected status cidr {cidr}, got {:?}",
            range.status.cidr
        )))
    }
}

#[then("the IpRange is ready")]
fn range_ready(operator_context: &OperatorContext) -> Result<(), StepError> {
    let range = stored_range(operator_context)?;
    let ready = range.status.common.conditions.is_true(CONDITION_READY)
        && range.status.common.state.as_deref() == Some(states::READY);
    if ready {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "IpRange not ready: {:?}",
            range.status
        )))
    }
}

#[then("the IpRange error reason is \"{reason}\"")]
fn error_reason(operator_context: &OperatorContext, reason: String) -> Result<(), StepError> {
    let range = stored_range(operator_context)?;
    let found = condition_reason(&range, CONDITION_ERROR);
    if found.as_deref() == Some(reason.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected error reason {reason}, got {found:?}"
        )))
    }
}

#[then("the IpRange warning reason is \"{reason}\"")]
fn warning_reason(operator_context: &OperatorContext, reason: String) -> Result<(), StepError> {
    let range = stored_range(operator_context)?;
    let found = condition_reason(&range, CONDITION_WARNING);
    if found.as_deref() == Some(reason.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected warning reason {reason}, got {found:?}"
        )))
    }
}

#[then("the IpRange state is \"{state}\"")]
fn range_state(operator_context: &OperatorContext, state: String) -> Result<(), StepError> {
    let range = stored_range(operator_context)?;
    if range.status.common.state.as_deref() == Some(state.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected state {state}, got {:?}",
            range.status.common.state
        )))
    }
}

#[then("the IpRange still exists")]
fn range_exists(operator_context: &OperatorContext) -> Result<(), StepError> {
    let range = stored_range(operator_context)?;
    if range.metadata.is_marked_for_deletion() && operator_context.provider.count("delete") == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from(
            "expected a marked IpRange with no provider deletion",
        )))
    }
}

#[then("the IpRange deletion is rechecked later")]
fn deletion_rechecked(operator_context: &OperatorContext) -> Result<(), StepError> {
    match operator_context.last_outcome() {
        Some(outcome) if outcome.delay().is_some() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a delayed requeue, got {other:?}"
        ))),
    }
}

#[then("neither the IpRange nor the NFS instance exists")]
fn both_gone(operator_context: &OperatorContext) -> Result<(), StepError> {
    let cluster = &operator_context.cluster;
    let range = block_on(cluster.get("IpRange", &range_key()))
        .map_err(|err| StepError::Assertion(format!("get IpRange: {err}")))?;
    let share = block_on(cluster.get("NfsInstance", &share_key()))
        .map_err(|err| StepError::Assertion(format!("get NfsInstance: {err}")))?;
    if range.is_none() && share.is_none() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "remaining objects: IpRange={}, NfsInstance={}",
            range.is_some(),
            share.is_some()
        )))
    }
}
