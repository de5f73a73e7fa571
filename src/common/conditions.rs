use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
    chrono::{DateTime, Utc},
};

use crate::api::ConditionType;

const TRUE: &str = "True";
const FALSE: &str = "False";

/// Named boolean facts attached to a workload or to one of its components.
///
/// Semantics follow the Kubernetes condition conventions: one entry per type, reason and
/// message always overwritten, `lastTransitionTime` moved only when the status flips.
pub trait Conditions {
    fn set_condition(&mut self, condition_type: ConditionType, status: bool, reason: &str, message: impl Into<String>, now: DateTime<Utc>) -> bool;
    fn find_condition(&self, condition_type: ConditionType) -> Option<&Condition>;

    fn is_condition_true(&self, condition_type: ConditionType) -> bool {
        self.find_condition(condition_type).is_some_and(|c| c.status == TRUE)
    }

    fn transition_time(&self, condition_type: ConditionType) -> Option<DateTime<Utc>> {
        self.find_condition(condition_type).map(|c| c.last_transition_time.0)
    }

    /// Sets the condition to false, but only if it is currently true.
    fn clear_condition(&mut self, condition_type: ConditionType, reason: &str, message: impl Into<String>, now: DateTime<Utc>) -> bool {
        if self.is_condition_true(condition_type) {
            self.set_condition(condition_type, false, reason, message, now)
        } else {
            false
        }
    }
}

impl Conditions for Vec<Condition> {
    fn set_condition(&mut self, condition_type: ConditionType, status: bool, reason: &str, message: impl Into<String>, now: DateTime<Utc>) -> bool {
        let status = if status { TRUE } else { FALSE };
        let message = message.into();

        if let Some(existing) = self.iter_mut().find(|c| c.type_ == condition_type.as_str()) {
            let mut changed = false;
            if existing.status != status {
                existing.status = status.to_owned();
                existing.last_transition_time = Time(now);
                changed = true;
            }
            if existing.reason != reason {
                reason.clone_into(&mut existing.reason);
                changed = true;
            }
            if existing.message != message {
                existing.message = message;
                changed = true;
            }
            changed
        } else {
            self.push(Condition {
                last_transition_time: Time(now),
                message,
                observed_generation: None,
                reason: reason.to_owned(),
                status: status.to_owned(),
                type_: condition_type.as_str().to_owned(),
            });
            true
        }
    }

    fn find_condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.iter().find(|c| c.type_ == condition_type.as_str())
    }
}
