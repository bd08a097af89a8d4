//! BDD scenarios for the IpRange lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{OperatorContext, operator_context};

#[scenario(path = "tests/features/iprange.feature", name = "Allocate an IP range")]
fn scenario_allocate_range(operator_context: OperatorContext) {
    let _ = operator_context;
}

#[scenario(
    path = "tests/features/iprange.feature",
    name = "Reject a range with host bits set"
)]
fn scenario_reject_host_bits(operator_context: OperatorContext) {
    let _ = operator_context;
}

#[scenario(
    path = "tests/features/iprange.feature",
    name = "Deletion is blocked while an NFS instance uses the range"
)]
fn scenario_deletion_blocked(operator_context: OperatorContext) {
    let _ = operator_context;
}

#[scenario(
    path = "tests/features/iprange.feature",
    name = "Deleting the NFS instance first releases the range"
)]
fn scenario_dependents_first(operator_context: OperatorContext) {
    let _ = operator_context;
}
