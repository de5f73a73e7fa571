use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::Result;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Cluster-wide defaults for the fault tolerance policy; each can be overridden per workload by annotation.
#[derive(Clone, Debug, PartialEq, TypedBuilder, Deserialize)]
#[serde(default)]
pub struct FaultToleranceConfiguration {
    #[serde(with = "humantime_serde")]
    #[builder(default = Duration::from_secs(60))]
    pub admission_grace_period: Duration,
    #[serde(with = "humantime_serde")]
    #[builder(default = Duration::from_secs(5 * 60))]
    pub warmup_grace_period: Duration,
    #[serde(with = "humantime_serde")]
    #[builder(default = Duration::from_secs(60))]
    pub failure_grace_period: Duration,
    #[serde(with = "humantime_serde")]
    #[builder(default = Duration::from_secs(90))]
    pub retry_pause_period: Duration,
    #[builder(default = 3)]
    pub retry_limit: i32,
    #[serde(with = "humantime_serde")]
    #[builder(default = Duration::from_secs(10 * 60))]
    pub forceful_deletion_grace_period: Duration,
    #[serde(with = "humantime_serde")]
    #[builder(default = Duration::ZERO)]
    pub deletion_on_failure_grace_period: Duration,
    #[serde(with = "humantime_serde")]
    #[builder(default = DAY)]
    pub grace_period_maximum: Duration,
    #[serde(with = "humantime_serde")]
    #[builder(default = 7 * DAY)]
    pub success_ttl: Duration,
}

impl Default for FaultToleranceConfiguration {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    pub controller_name: String,
    #[builder(default)]
    pub enable_open_telemetry: Option<bool>,
    #[serde(default)]
    #[builder(default)]
    pub fault_tolerance: FaultToleranceConfiguration,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigurationError {
    #[error("controller name must be not empty")]
    ControllerName,
    #[error("{0} must not exceed grace_period_maximum")]
    ExceedsMaximum(&'static str),
    #[error("admission_grace_period must not exceed warmup_grace_period")]
    AdmissionExceedsWarmup,
    #[error("success_ttl must be positive")]
    SuccessTtl,
    #[error("retry_limit must not be negative")]
    RetryLimit,
}

impl FaultToleranceConfiguration {
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        let bounded = [
            ("admission_grace_period", self.admission_grace_period),
            ("warmup_grace_period", self.warmup_grace_period),
            ("failure_grace_period", self.failure_grace_period),
            ("retry_pause_period", self.retry_pause_period),
            ("forceful_deletion_grace_period", self.forceful_deletion_grace_period),
            ("deletion_on_failure_grace_period", self.deletion_on_failure_grace_period),
        ];
        if let Some((name, _)) = bounded.iter().find(|(_, period)| *period > self.grace_period_maximum) {
            return Err(ConfigurationError::ExceedsMaximum(name));
        }
        if self.admission_grace_period > self.warmup_grace_period {
            return Err(ConfigurationError::AdmissionExceedsWarmup);
        }
        if self.success_ttl.is_zero() {
            return Err(ConfigurationError::SuccessTtl);
        }
        if self.retry_limit < 0 {
            return Err(ConfigurationError::RetryLimit);
        }
        Ok(())
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.is_empty() {
            return Err(ConfigurationError::ControllerName.into());
        }
        self.fault_tolerance.validate()?;
        Ok(())
    }
}
