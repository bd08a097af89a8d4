//! Behavioural scenarios for the IpRange lifecycle and its dependency guard.

#[path = "common/fixtures.rs"]
mod fixtures;

mod iprange;
