use std::{collections::BTreeMap, time::Duration};

use kube::ResourceExt;
use tracing::warn;

use crate::{
    api::{
        AppWrapper, ADMISSION_GRACE_PERIOD_ANNOTATION, DELETION_ON_FAILURE_GRACE_PERIOD_ANNOTATION, FAILURE_GRACE_PERIOD_ANNOTATION,
        FORCEFUL_DELETION_GRACE_PERIOD_ANNOTATION, RETRY_LIMIT_ANNOTATION, RETRY_PAUSE_PERIOD_ANNOTATION, SUCCESS_TTL_ANNOTATION,
        WARMUP_GRACE_PERIOD_ANNOTATION,
    },
    configuration::FaultToleranceConfiguration,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraceKind {
    Admission,
    Warmup,
    Failure,
    RetryPause,
    ForcefulDeletion,
    DeletionOnFailure,
    SuccessTtl,
}

impl GraceKind {
    pub const fn annotation(self) -> &'static str {
        match self {
            GraceKind::Admission => ADMISSION_GRACE_PERIOD_ANNOTATION,
            GraceKind::Warmup => WARMUP_GRACE_PERIOD_ANNOTATION,
            GraceKind::Failure => FAILURE_GRACE_PERIOD_ANNOTATION,
            GraceKind::RetryPause => RETRY_PAUSE_PERIOD_ANNOTATION,
            GraceKind::ForcefulDeletion => FORCEFUL_DELETION_GRACE_PERIOD_ANNOTATION,
            GraceKind::DeletionOnFailure => DELETION_ON_FAILURE_GRACE_PERIOD_ANNOTATION,
            GraceKind::SuccessTtl => SUCCESS_TTL_ANNOTATION,
        }
    }
}

/// Resolves the effective fault tolerance parameters of a workload from its annotations and the
/// cluster defaults. Malformed overrides are logged and ignored.
#[derive(Clone, Debug, Default)]
pub struct GracePolicy {
    config: FaultToleranceConfiguration,
}

impl GracePolicy {
    pub fn new(config: FaultToleranceConfiguration) -> Self {
        Self { config }
    }

    pub fn resolve(&self, kind: GraceKind, appwrapper: &AppWrapper) -> Duration {
        self.resolve_annotations(kind, appwrapper.annotations())
    }

    pub fn retry_limit(&self, appwrapper: &AppWrapper) -> i32 {
        match appwrapper.annotations().get(RETRY_LIMIT_ANNOTATION) {
            None => self.config.retry_limit,
            Some(value) => match value.trim().parse::<i32>() {
                Ok(limit) => limit,
                Err(e) => {
                    warn!("retry_limit: {} ignoring malformed {RETRY_LIMIT_ANNOTATION}={value} {e}", appwrapper.name_any());
                    self.config.retry_limit
                },
            },
        }
    }

    fn resolve_annotations(&self, kind: GraceKind, annotations: &BTreeMap<String, String>) -> Duration {
        let default = self.default_period(kind);
        let Some(value) = annotations.get(kind.annotation()) else {
            return self.limit(kind, default);
        };
        let requested = match parse_signed_duration(value) {
            Ok(requested) => requested,
            Err(e) => {
                warn!("resolve: ignoring malformed {}={value} {e}", kind.annotation());
                return self.limit(kind, default);
            },
        };

        if kind == GraceKind::SuccessTtl {
            return if !requested.is_zero() && requested < default { requested } else { default };
        }
        if requested > self.config.grace_period_maximum {
            warn!("resolve: {}={value} exceeds grace period maximum {}", kind.annotation(), humantime::format_duration(self.config.grace_period_maximum));
        }
        self.limit(kind, requested)
    }

    fn default_period(&self, kind: GraceKind) -> Duration {
        match kind {
            GraceKind::Admission => self.config.admission_grace_period,
            GraceKind::Warmup => self.config.warmup_grace_period,
            GraceKind::Failure => self.config.failure_grace_period,
            GraceKind::RetryPause => self.config.retry_pause_period,
            GraceKind::ForcefulDeletion => self.config.forceful_deletion_grace_period,
            GraceKind::DeletionOnFailure => self.config.deletion_on_failure_grace_period,
            GraceKind::SuccessTtl => self.config.success_ttl,
        }
    }

    fn limit(&self, kind: GraceKind, period: Duration) -> Duration {
        if kind == GraceKind::SuccessTtl {
            period
        } else {
            period.min(self.config.grace_period_maximum)
        }
    }
}

/// Parses a duration such as `90s` or `1h30m`. Negative durations count as zero.
fn parse_signed_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    let value = value.trim();
    if let Some(magnitude) = value.strip_prefix('-') {
        humantime::parse_duration(magnitude)?;
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(value.strip_prefix('+').unwrap_or(value))
}
