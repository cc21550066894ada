// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status conditions reported on a Stack.
//!
//! Two condition types are used. `Ready` tracks the install itself
//! (`Creating` while the pipeline runs, `Available` once it completed) and
//! `Synced` tracks the outcome of the last reconcile (`ReconcileSuccess` or
//! `ReconcileError` with the error as message).

use crate::types::stack::Condition;
use chrono::Utc;

pub const TYPE_READY: &str = "Ready";
pub const TYPE_SYNCED: &str = "Synced";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

pub const REASON_CREATING: &str = "Creating";
pub const REASON_AVAILABLE: &str = "Available";
pub const REASON_RECONCILE_SUCCESS: &str = "ReconcileSuccess";
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";

fn build(condition_type: &str, status: &str, reason: &str, message: Option<String>) -> Condition {
    Condition {
        condition_type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message,
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

pub fn creating() -> Condition {
    build(TYPE_READY, STATUS_FALSE, REASON_CREATING, None)
}

pub fn available() -> Condition {
    build(TYPE_READY, STATUS_TRUE, REASON_AVAILABLE, None)
}

pub fn reconcile_success() -> Condition {
    build(TYPE_SYNCED, STATUS_TRUE, REASON_RECONCILE_SUCCESS, None)
}

pub fn reconcile_error(err: &dyn std::error::Error) -> Condition {
    build(
        TYPE_SYNCED,
        STATUS_FALSE,
        REASON_RECONCILE_ERROR,
        Some(err.to_string()),
    )
}

/// Set or replace the condition of the same type, keeping lastTransitionTime
/// when the status did not change.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == new.condition_type)
    {
        Some(existing) if existing.status == new.status => {
            existing.reason = new.reason;
            existing.message = new.message;
        }
        Some(existing) => *existing = new,
        None => conditions.push(new),
    }
}

pub fn find<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}
