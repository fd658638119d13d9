//! Condition helpers for AuraInstance status
//!
//! `Ready` and `Reconciling` are the only condition types written. Setting
//! `Ready` to a terminal value always drops `Reconciling` first.

use chrono::{SecondsFormat, Utc};

use crate::crd::{AuraInstanceStatus, Condition};

pub const READY: &str = "Ready";
pub const RECONCILING: &str = "Reconciling";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";
pub const STATUS_UNKNOWN: &str = "Unknown";

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Insert or update a condition of the given type.
///
/// The transition time only moves when the status value changes.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.status = status.to_string();
            existing.last_transition_time = now();
        }
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = observed_generation;
        return;
    }

    conditions.push(Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        last_transition_time: now(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation,
    });
}

pub fn remove_condition(conditions: &mut Vec<Condition>, type_: &str) {
    conditions.retain(|c| c.type_ != type_);
}

/// Set `Ready` to True or False, clearing `Reconciling` first
pub fn mark_ready(
    status: &mut AuraInstanceStatus,
    ready: bool,
    reason: &str,
    message: &str,
    generation: Option<i64>,
) {
    remove_condition(&mut status.conditions, RECONCILING);
    let value = if ready { STATUS_TRUE } else { STATUS_FALSE };
    set_condition(
        &mut status.conditions,
        READY,
        value,
        reason,
        message,
        generation,
    );
}

/// Set `Reconciling=True`; adds `Ready=Unknown` when no `Ready` exists yet
pub fn mark_reconciling(
    status: &mut AuraInstanceStatus,
    reason: &str,
    message: &str,
    generation: Option<i64>,
) {
    set_condition(
        &mut status.conditions,
        RECONCILING,
        STATUS_TRUE,
        reason,
        message,
        generation,
    );
    if status.condition(READY).is_none() {
        set_condition(
            &mut status.conditions,
            READY,
            STATUS_UNKNOWN,
            reason,
            message,
            generation,
        );
    }
}
