use std::time::Duration;

use k8s_openapi::chrono::{DateTime, TimeDelta, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time left until `anchor + period`, or `None` once the deadline has passed.
///
/// A missing anchor counts as a deadline that already passed.
pub fn remaining(anchor: Option<DateTime<Utc>>, period: Duration, now: DateTime<Utc>) -> Option<Duration> {
    let anchor = anchor?;
    let period = TimeDelta::from_std(period).unwrap_or(TimeDelta::MAX);
    let deadline = anchor.checked_add_signed(period).unwrap_or(DateTime::<Utc>::MAX_UTC);
    if now < deadline {
        (deadline - now).to_std().ok()
    } else {
        None
    }
}
