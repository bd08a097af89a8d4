//! Status conditions and the set semantics the kernel applies to them.
//!
//! A [`ConditionSet`] holds at most one condition per type. Setting a
//! condition whose status is unchanged keeps its transition time, which keeps
//! repeated reconciliations byte-for-byte idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition type signalling the object reached its desired state.
pub const CONDITION_READY: &str = "Ready";
/// Condition type signalling a failure that needs attention.
pub const CONDITION_ERROR: &str = "Error";
/// Condition type signalling a non-fatal problem.
pub const CONDITION_WARNING: &str = "Warning";

/// Reason used with a true [`CONDITION_READY`].
pub const REASON_READY: &str = "Ready";
/// Reason recorded while deletion is blocked by dependent objects.
pub const REASON_DELETE_WHILE_USED: &str = "DeleteWhileUsed";
/// Reason recorded when a provider operation reports failure.
pub const REASON_OPERATION_FAILED: &str = "OperationFailed";
/// Reason recorded when a provider call fails outright.
pub const REASON_PROVIDER_ERROR: &str = "ProviderError";
/// Reason recorded when the desired state fails validation.
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";
/// Reason recorded when the scope named by an object does not exist.
pub const REASON_SCOPE_NOT_FOUND: &str = "ScopeNotFound";
/// Reason recorded when a referenced object does not exist.
pub const REASON_DEPENDENCY_NOT_FOUND: &str = "DependencyNotFound";

/// Tri-state status of a condition.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The condition could not be evaluated.
    Unknown,
}

/// A typed status observation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, unique within a [`ConditionSet`].
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Whether the condition holds.
    pub status: ConditionStatus,
    /// Machine readable reason.
    pub reason: String,
    /// Human readable message.
    pub message: String,
    /// Object generation the condition was computed against.
    #[serde(default)]
    pub observed_generation: i64,
    /// Time the status last changed.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Creates a condition stamped with the current time.
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation: 0,
            last_transition_time: Utc::now(),
        }
    }

    /// A true `Ready` condition.
    pub fn ready(message: impl Into<String>) -> Self {
        Self::new(CONDITION_READY, ConditionStatus::True, REASON_READY, message)
    }

    /// A true `Error` condition.
    pub fn error(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CONDITION_ERROR, ConditionStatus::True, reason, message)
    }

    /// A true `Warning` condition.
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CONDITION_WARNING, ConditionStatus::True, reason, message)
    }

    /// Returns `true` when the status is [`ConditionStatus::True`].
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Named set of condition types that exclude each other.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConditionGroup {
    members: &'static [&'static str],
}

impl ConditionGroup {
    /// Creates a group from its member types.
    #[must_use]
    pub const fn new(members: &'static [&'static str]) -> Self {
        Self { members }
    }

    /// Member condition types.
    #[must_use]
    pub const fn members(&self) -> &'static [&'static str] {
        self.members
    }

    /// Returns `true` when the type belongs to the group.
    #[must_use]
    pub fn contains(&self, condition_type: &str) -> bool {
        self.members.iter().any(|member| *member == condition_type)
    }
}

/// Ready, Error, and Warning are mutually exclusive health signals.
pub const HEALTH: ConditionGroup =
    ConditionGroup::new(&[CONDITION_READY, CONDITION_ERROR, CONDITION_WARNING]);

/// Conditions keyed by type, kept sorted by type.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Iterates conditions in type order.
    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.0.iter()
    }

    /// Number of conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no condition is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Finds a condition by type.
    #[must_use]
    pub fn find(&self, condition_type: &str) -> Option<&Condition> {
        self.0
            .iter()
            .find(|cond| cond.condition_type == condition_type)
    }

    /// Returns `true` when the condition exists and is true.
    #[must_use]
    pub fn is_true(&self, condition_type: &str) -> bool {
        self.find(condition_type).is_some_and(Condition::is_true)
    }

    /// Condition types currently present.
    #[must_use]
    pub fn types(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|cond| cond.condition_type.clone())
            .collect()
    }

    /// Inserts or updates a condition and reports whether anything changed.
    ///
    /// The transition time of an existing condition moves only when its
    /// status flips.
    pub fn set(&mut self, condition: Condition) -> bool {
        if let Some(existing) = self
            .0
            .iter_mut()
            .find(|cond| cond.condition_type == condition.condition_type)
        {
            let mut changed = false;
            if existing.status != condition.status {
                existing.status = condition.status;
                existing.last_transition_time = condition.last_transition_time;
                changed = true;
            }
            if existing.reason != condition.reason {
                existing.reason = condition.reason;
                changed = true;
            }
            if existing.message != condition.message {
                existing.message = condition.message;
                changed = true;
            }
            if existing.observed_generation != condition.observed_generation {
                existing.observed_generation = condition.observed_generation;
                changed = true;
            }
            return changed;
        }

        let at = self
            .0
            .partition_point(|cond| cond.condition_type < condition.condition_type);
        self.0.insert(at, condition);
        true
    }

    /// Removes a condition by type and reports whether it existed.
    pub fn remove(&mut self, condition_type: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|cond| cond.condition_type != condition_type);
        before != self.0.len()
    }

    /// Removes a condition only when it carries the given reason.
    pub fn remove_if_reason(&mut self, condition_type: &str, reason: &str) -> bool {
        let before = self.0.len();
        self.0
            .retain(|cond| !(cond.condition_type == condition_type && cond.reason == reason));
        before != self.0.len()
    }

    /// Sets a condition and drops the other members of its group, except
    /// those listed in `keep`.
    pub fn set_exclusive(
        &mut self,
        condition: Condition,
        group: &ConditionGroup,
        keep: &[String],
    ) -> bool {
        let mut changed = false;
        if group.contains(&condition.condition_type) {
            for member in group.members() {
                if *member != condition.condition_type && !keep.iter().any(|kept| kept == member)
                {
                    changed |= self.remove(member);
                }
            }
        }
        changed | self.set(condition)
    }
}

impl<'a> IntoIterator for &'a ConditionSet {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
