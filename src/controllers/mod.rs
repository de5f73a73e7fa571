use std::time::Duration;
pub mod appwrapper;
mod deletion;
pub mod grace;
pub mod state_machine;
mod status;
#[cfg(test)]
mod testing;

pub use appwrapper::{AppWrapperController, AppWrapperControllerContext};
pub use deletion::DeletionOrchestrator;
pub use grace::{GraceKind, GracePolicy};
pub use state_machine::{AppWrapperReconciler, Outcome};
pub use status::{ComponentStatusSummary, PodStatusSummary, StatusAggregator};

use crate::{common::TemplateError, services::StoreError};

const TARGET: &str = "appwrapper_controller::controllers";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ControllerError {
    Store(#[from] StoreError),
    InvalidPayload(String),
    InvalidTemplate(#[from] TemplateError),
}

const RECONCILE_LONG_WAIT: Duration = Duration::from_secs(3600);
const RECONCILE_ERROR_WAIT: Duration = Duration::from_secs(15);
const RECONCILE_CONFLICT_WAIT: Duration = Duration::from_secs(1);

/// Polling interval while children or pods are still terminating.
pub const DELETION_POLL_WAIT: Duration = Duration::from_secs(5);
/// Re-check interval for a workload that has all its pods ready.
pub const READY_POLL_WAIT: Duration = Duration::from_secs(60);
/// Upper bound on the wait while a workload is still coming up.
pub const NOT_READY_POLL_WAIT: Duration = Duration::from_secs(5);

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
