//! Provider condition bookkeeping.
//!
//! Conditions are unique per type. Recording a condition refreshes its probe
//! time every time and moves its transition time only when the status flips.

use chrono::{DateTime, Utc};
use crds::{ConditionStatus, ProviderCondition, CONDITION_FAILURE, REASON_MACHINE_CREATION_FAILED};

/// Record `condition` in `conditions`, replacing any condition of the same type.
pub fn set_condition(conditions: &mut Vec<ProviderCondition>, mut condition: ProviderCondition, now: DateTime<Utc>) {
    condition.last_probe_time = Some(now);

    match conditions.iter_mut().find(|c| c.condition_type == condition.condition_type) {
        Some(existing) => {
            if existing.status != condition.status {
                existing.last_transition_time = Some(now);
            }
            existing.status = condition.status;
            existing.reason = condition.reason;
            existing.message = condition.message;
            existing.last_probe_time = condition.last_probe_time;
        }
        None => {
            condition.last_transition_time = Some(now);
            conditions.push(condition);
        }
    }
}

/// `Failure` condition reporting a failed VM creation.
pub fn creation_failed(message: impl Into<String>) -> ProviderCondition {
    ProviderCondition::new(CONDITION_FAILURE, ConditionStatus::True, REASON_MACHINE_CREATION_FAILED, message)
}
