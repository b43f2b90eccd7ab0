use chrono::{SecondsFormat, Utc};

use crate::crd::{
    Condition, ConditionStatus, ConditionType, StorePhase, StoreStatus,
};

pub const REASON_PROVISIONING: &str = "Provisioning";
pub const REASON_HELM_ERROR: &str = "HelmError";
pub const REASON_WAITING_FOR_PODS: &str = "WaitingForPods";
pub const REASON_READY: &str = "Ready";

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Set phase, reason and message together and keep the `Ready` condition
/// in step with them.
pub fn transition(
    status: &mut StoreStatus,
    phase: StorePhase,
    reason: Option<&str>,
    message: Option<String>,
) {
    status.phase = Some(phase);
    status.reason = reason.map(str::to_string);
    status.message = message.clone();
    let ready = if phase == StorePhase::Ready {
        ConditionStatus::True
    } else {
        ConditionStatus::False
    };
    set_ready_condition(
        status,
        ready,
        reason.unwrap_or(REASON_READY),
        message,
        &now_rfc3339(),
    );
}

/// Upsert the `Ready` condition. `lastTransitionTime` only moves when the
/// condition's status changes.
pub fn set_ready_condition(
    status: &mut StoreStatus,
    ready: ConditionStatus,
    reason: &str,
    message: Option<String>,
    now: &str,
) {
    match status
        .conditions
        .iter_mut()
        .find(|c| c.type_ == ConditionType::Ready)
    {
        Some(c) => {
            if c.status != ready {
                c.last_transition_time = Some(now.to_string());
            }
            c.status = ready;
            c.reason = Some(reason.to_string());
            c.message = message;
        }
        None => status.conditions.push(Condition {
            type_: ConditionType::Ready,
            status: ready,
            reason: Some(reason.to_string()),
            message,
            last_transition_time: Some(now.to_string()),
        }),
    }
}
