//! BDD scenarios for the Nuke cascade.

use rstest_bdd_macros::scenario;

use super::test_helpers::{NukeContext, nuke_context};

#[scenario(
    path = "tests/features/nuke.feature",
    name = "The first pass marks every scope resource for deletion"
)]
fn scenario_first_pass(nuke_context: NukeContext) {
    let _ = nuke_context;
}

#[scenario(
    path = "tests/features/nuke.feature",
    name = "The Nuke completes once the resource reconcilers release their objects"
)]
fn scenario_completes(nuke_context: NukeContext) {
    let _ = nuke_context;
}
