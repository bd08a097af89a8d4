//! Unit tests for operation tracking and polling.

use std::time::Duration;

use super::*;
use crate::action::Action as _;
use crate::cluster::{ClusterOp, InMemoryCluster};
use crate::condition::CONDITION_ERROR;
use crate::error::ProviderError;
use crate::resources::{IpRange, IpRangeSpec};
use crate::state::BaseState;
use crate::test_support::{ScriptedProvider, seed};
use rstest::rstest;

const INTERVAL: Duration = Duration::from_secs(5);
const FAILURE_DELAY: Duration = Duration::from_secs(300);

async fn state_with_operation(
    cluster: &InMemoryCluster,
    operation: Option<&str>,
) -> BaseState<IpRange> {
    let mut range = IpRange::new(
        "kcp-system",
        "range-a",
        IpRangeSpec {
            scope: String::from("scope-a"),
            cidr: String::from("10.0.0.0/24"),
            network: None,
        },
    );
    range.status.common.operation_identifier = operation.map(str::to_owned);
    let stored = seed(cluster, &range).await.expect("seed");
    BaseState::new(Arc::new(cluster.clone()), stored)
}

fn poller_for(provider: &ScriptedProvider) -> BoxedAction<BaseState<IpRange>> {
    let poller: Arc<dyn OperationPoller> = Arc::new(provider.clone());
    poll_operation(
        move |_: &BaseState<IpRange>| Ok(Arc::clone(&poller)),
        PollSettings::new(INTERVAL, FAILURE_DELAY),
    )
}

#[rstest]
#[tokio::test]
async fn without_operation_nothing_is_polled() {
    let cluster = InMemoryCluster::new();
    let provider = ScriptedProvider::new();
    let mut state = state_with_operation(&cluster, None).await;

    assert_eq!(poller_for(&provider).run(&mut state).await, Outcome::Continue);
    assert_eq!(provider.count("poll"), 0);
}

#[rstest]
#[tokio::test]
async fn pending_operation_waits_for_interval() {
    let cluster = InMemoryCluster::new();
    let provider = ScriptedProvider::new();
    provider.push_poll(Ok(OperationState::Pending));
    let mut state = state_with_operation(&cluster, Some("op-1")).await;

    let outcome = poller_for(&provider).run(&mut state).await;
    assert_eq!(outcome, Outcome::RetryAfter(INTERVAL));
    assert_eq!(
        state.obj().status.common.operation_identifier.as_deref(),
        Some("op-1")
    );
    assert_eq!(cluster.calls(ClusterOp::PatchStatus).await, 0);
}

#[rstest]
#[tokio::test]
async fn finished_operation_is_cleared_and_pipeline_continues() {
    let cluster = InMemoryCluster::new();
    let provider = ScriptedProvider::new();
    provider.push_poll(Ok(OperationState::Succeeded));
    let mut state = state_with_operation(&cluster, Some("op-1")).await;

    assert_eq!(poller_for(&provider).run(&mut state).await, Outcome::Continue);
    assert_eq!(state.obj().status.common.operation_identifier, None);
    assert!(!state.status_changed());
}

#[rstest]
#[tokio::test]
async fn failed_operation_records_error_and_backs_off() {
    let cluster = InMemoryCluster::new();
    let provider = ScriptedProvider::new();
    provider.push_poll(Ok(OperationState::Failed {
        message: String::from("quota exceeded"),
    }));
    let mut state = state_with_operation(&cluster, Some("op-1")).await;

    let outcome = poller_for(&provider).run(&mut state).await;
    assert_eq!(outcome, Outcome::RetryAfter(FAILURE_DELAY));
    let common = &state.obj().status.common;
    assert_eq!(common.operation_identifier, None);
    assert_eq!(common.state.as_deref(), Some("Error"));
    let error = common.conditions.find(CONDITION_ERROR).expect("error condition");
    assert_eq!(error.reason, "OperationFailed");
    assert_eq!(error.message, "quota exceeded");
}

#[rstest]
#[tokio::test]
async fn poll_error_keeps_operation_for_next_attempt() {
    let cluster = InMemoryCluster::new();
    let provider = ScriptedProvider::new();
    provider.push_poll(Err(ProviderError::Api {
        message: String::from("timeout"),
    }));
    let mut state = state_with_operation(&cluster, Some("op-1")).await;

    let outcome = poller_for(&provider).run(&mut state).await;
    assert_eq!(outcome, Outcome::RetryAfter(FAILURE_DELAY));
    assert_eq!(
        state.obj().status.common.operation_identifier.as_deref(),
        Some("op-1")
    );
}

#[rstest]
#[tokio::test]
async fn unknown_operation_is_dropped_and_pipeline_continues() {
    let cluster = InMemoryCluster::new();
    let provider = ScriptedProvider::new();
    provider.push_poll(Err(ProviderError::OperationNotFound {
        operation_id: String::from("op-1"),
    }));
    let mut state = state_with_operation(&cluster, Some("op-1")).await;

    assert_eq!(poller_for(&provider).run(&mut state).await, Outcome::Continue);
    assert_eq!(state.obj().status.common.operation_identifier, None);
    assert!(!state.status_changed());
    assert_eq!(cluster.calls(ClusterOp::PatchStatus).await, 1);
}

#[rstest]
#[tokio::test]
async fn started_call_is_tracked_and_stops_pipeline() {
    let cluster = InMemoryCluster::new();
    let mut state = state_with_operation(&cluster, None).await;

    let outcome = track_operation(
        &mut state,
        ProviderCall::Started {
            operation_id: String::from("op-9"),
        },
        INTERVAL,
    )
    .await;
    assert_eq!(outcome, Outcome::RetryAfter(INTERVAL));
    assert_eq!(cluster.calls(ClusterOp::PatchStatus).await, 1);
    assert_eq!(
        state.obj().status.common.operation_identifier.as_deref(),
        Some("op-9")
    );

    let completed = track_operation(&mut state, ProviderCall::Completed, INTERVAL).await;
    assert_eq!(completed, Outcome::Continue);
}
