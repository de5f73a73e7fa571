use std::{sync::Arc, time::Duration};

use k8s_openapi::chrono::{DateTime, Utc};
use kube::{runtime::controller::Action, Resource, ResourceExt};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use super::{
    ControllerError, DeletionOrchestrator, GraceKind, GracePolicy, StatusAggregator, DELETION_POLL_WAIT, NOT_READY_POLL_WAIT, READY_POLL_WAIT, TARGET,
};
use crate::{
    api::{AppWrapper, AppWrapperComponentStatus, AppWrapperStatus, ConditionType, Phase, APPWRAPPER_FINALIZER, DELETION_ON_FAILURE_GRACE_PERIOD_ANNOTATION},
    common::{component_identity, remaining, Clock, Conditions, ResourceKey, TemplateError},
    services::{ComponentMaterializer, KindResolver, PodCountCalculator, StoreError, WorkloadPods, WorkloadStore},
};

type Result<T, E = ControllerError> = std::result::Result<T, E>;

const SUSPEND_TRUE: &str = "Suspend is true";
const SUSPEND_FALSE: &str = "Suspend is false";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    RequeueAfter(Duration),
}

impl From<Outcome> for Action {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Action::await_change(),
            Outcome::RequeueAfter(after) => Action::requeue(after),
        }
    }
}

struct Step {
    phase: Phase,
    outcome: Outcome,
}

impl Step {
    fn to(phase: Phase) -> Self {
        Self { phase, outcome: Outcome::Done }
    }

    fn wait(phase: Phase, after: Duration) -> Self {
        Self { phase, outcome: Outcome::RequeueAfter(after) }
    }
}

/// Drives one AppWrapper through its lifecycle.
///
/// Every invocation re-reads the workload, decides the next phase from the persisted status and
/// the live cluster state, and commits the status at most once.
#[derive(TypedBuilder)]
pub struct AppWrapperReconciler {
    store: Arc<dyn WorkloadStore>,
    kinds: Arc<dyn KindResolver>,
    pods: Arc<dyn WorkloadPods>,
    pod_counter: Arc<dyn PodCountCalculator>,
    materializer: Arc<dyn ComponentMaterializer>,
    grace: GracePolicy,
    clock: Arc<dyn Clock>,
}

impl AppWrapperReconciler {
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<Outcome> {
        let mut appwrapper = match self.store.get(key).await {
            Ok(appwrapper) => appwrapper,
            Err(StoreError::NotFound(_)) => {
                debug!(target: TARGET, "{key} is gone");
                return Ok(Outcome::Done);
            },
            Err(e) => return Err(e.into()),
        };
        let now = self.clock.now();

        if appwrapper.meta().deletion_timestamp.is_some() {
            return self.finalize(key, appwrapper, now).await;
        }

        let original = appwrapper.status.clone().unwrap_or_default();
        let step = match original.phase {
            Phase::Empty => self.initialize(&mut appwrapper).await?,
            Phase::Suspended => Self::suspended(&mut appwrapper, now),
            Phase::Resuming => self.resuming(&mut appwrapper, now).await,
            Phase::Running => self.running(&mut appwrapper, now).await?,
            Phase::Suspending => self.suspending(&mut appwrapper, now).await,
            Phase::Resetting => self.resetting(&mut appwrapper, now).await,
            Phase::Failed => self.failed(&mut appwrapper, now).await,
            Phase::Succeeded => self.succeeded(&mut appwrapper, now).await,
            Phase::Terminating => Step::to(Phase::Terminating),
        };

        self.commit(key, &mut appwrapper, &original, step.phase).await?;
        Ok(step.outcome)
    }

    async fn commit(&self, key: &ResourceKey, appwrapper: &mut AppWrapper, original: &AppWrapperStatus, phase: Phase) -> Result<()> {
        let status = status_mut(appwrapper);
        status.phase = phase;
        if *status == *original {
            debug!(target: TARGET, "{key} status not changed");
            return Ok(());
        }
        self.store.update_status(appwrapper).await?;
        if phase != original.phase {
            info!(target: TARGET, "{key} phase {} -> {phase}", original.phase);
        }
        Ok(())
    }

    async fn initialize(&self, appwrapper: &mut AppWrapper) -> Result<Step> {
        let updated = self.store.add_finalizer(appwrapper).await?;
        appwrapper.metadata = updated.metadata;
        initialize_component_status(appwrapper)?;
        Ok(Step::to(Phase::Suspended))
    }

    fn suspended(appwrapper: &mut AppWrapper, now: DateTime<Utc>) -> Step {
        if appwrapper.spec.suspend {
            return Step::to(Phase::Suspended);
        }
        let reason = Phase::Resuming.as_str();
        let conditions = &mut status_mut(appwrapper).conditions;
        conditions.set_condition(ConditionType::QuotaReserved, true, reason, SUSPEND_FALSE, now);
        conditions.set_condition(ConditionType::ResourcesDeployed, true, reason, SUSPEND_FALSE, now);
        conditions.set_condition(ConditionType::PodsReady, false, reason, SUSPEND_FALSE, now);
        conditions.set_condition(ConditionType::Unhealthy, false, reason, SUSPEND_FALSE, now);
        Step::to(Phase::Resuming)
    }

    async fn resuming(&self, appwrapper: &mut AppWrapper, now: DateTime<Utc>) -> Step {
        if appwrapper.spec.suspend {
            return Step::to(Phase::Suspending);
        }
        let Err(e) = self.materializer.create_components(appwrapper).await else {
            return Step::to(Phase::Running);
        };

        let key = ResourceKey::from(&*appwrapper);
        status_mut(appwrapper).conditions.set_condition(ConditionType::Unhealthy, true, "CreateFailed", format!("error creating components: {e}"), now);
        if e.fatal {
            warn!(target: TARGET, "{key} creating components failed permanently {e}");
            Step::to(Phase::Failed)
        } else {
            warn!(target: TARGET, "{key} creating components failed {e}");
            self.reset_or_fail(appwrapper)
        }
    }

    async fn running(&self, appwrapper: &mut AppWrapper, now: DateTime<Utc>) -> Result<Step> {
        if appwrapper.spec.suspend {
            return Ok(Step::to(Phase::Suspending));
        }
        let key = ResourceKey::from(&*appwrapper);
        let aggregator = self.aggregator();

        let components = aggregator.component_status(&key.namespace, &mut status_mut(appwrapper).component_status, now).await?;
        if components.deployed != components.expected {
            let message = format!("Only found {} deployed components, but was expecting {}", components.deployed, components.expected);
            warn!(target: TARGET, "{key} {message}");
            status_mut(appwrapper).conditions.set_condition(ConditionType::Unhealthy, true, "MissingComponent", message, now);
            return Ok(Step::to(Phase::Failed));
        }

        let pods = aggregator.pod_status(appwrapper).await?;
        debug!(target: TARGET, "{key} {pods:?}");

        if pods.succeeded >= pods.expected && pods.pending + pods.running + pods.failed == 0 {
            let message = format!("{} pods succeeded and no running, pending, or failed pods", pods.succeeded);
            let reason = Phase::Succeeded.as_str();
            let conditions = &mut status_mut(appwrapper).conditions;
            conditions.set_condition(ConditionType::QuotaReserved, false, reason, message.clone(), now);
            conditions.set_condition(ConditionType::ResourcesDeployed, true, reason, message, now);
            return Ok(Step::to(Phase::Succeeded));
        }

        if pods.failed > 0 {
            status_mut(appwrapper).conditions.set_condition(ConditionType::Unhealthy, true, "FoundFailedPods", "", now);
            let grace = self.grace.resolve(GraceKind::Failure, appwrapper);
            return Ok(match remaining(transition_time(appwrapper, ConditionType::Unhealthy), grace, now) {
                Some(wait) => Step::wait(Phase::Running, wait),
                None => self.reset_or_fail(appwrapper),
            });
        }

        status_mut(appwrapper).conditions.clear_condition(ConditionType::Unhealthy, "FoundNoFailedPods", "", now);

        if pods.running + pods.succeeded >= pods.expected {
            let message = format!("{} pods running; {} pods succeeded", pods.running, pods.succeeded);
            status_mut(appwrapper).conditions.set_condition(ConditionType::PodsReady, true, "SufficientPodsReady", message, now);
            return Ok(Step::wait(Phase::Running, READY_POLL_WAIT));
        }

        let details = format!("{} pods pending; {} pods running; {} pods succeeded", pods.pending, pods.running, pods.succeeded);
        status_mut(appwrapper).conditions.clear_condition(ConditionType::PodsReady, "InsufficientPodsReady", details.clone(), now);
        let kind = if pods.pending + pods.running + pods.succeeded >= pods.expected { GraceKind::Warmup } else { GraceKind::Admission };
        let grace = self.grace.resolve(kind, appwrapper);
        match remaining(transition_time(appwrapper, ConditionType::ResourcesDeployed), grace, now) {
            Some(wait) => Ok(Step::wait(Phase::Running, wait.min(NOT_READY_POLL_WAIT))),
            None => {
                warn!(target: TARGET, "{key} {kind:?} grace period expired with {details}");
                status_mut(appwrapper).conditions.set_condition(ConditionType::Unhealthy, true, "InsufficientPodsReady", details, now);
                Ok(self.reset_or_fail(appwrapper))
            },
        }
    }

    async fn suspending(&self, appwrapper: &mut AppWrapper, now: DateTime<Utc>) -> Step {
        let reason = Phase::Suspended.as_str();
        if is_condition_true(appwrapper, ConditionType::ResourcesDeployed) {
            if !self.deletion().delete_all(appwrapper, now).await {
                return Step::wait(Phase::Suspending, DELETION_POLL_WAIT);
            }
            status_mut(appwrapper).conditions.set_condition(ConditionType::ResourcesDeployed, false, reason, SUSPEND_TRUE, now);
        }
        let conditions = &mut status_mut(appwrapper).conditions;
        conditions.set_condition(ConditionType::QuotaReserved, false, reason, SUSPEND_TRUE, now);
        conditions.clear_condition(ConditionType::PodsReady, reason, "", now);
        conditions.clear_condition(ConditionType::Unhealthy, reason, "", now);
        Step::to(Phase::Suspended)
    }

    async fn resetting(&self, appwrapper: &mut AppWrapper, now: DateTime<Utc>) -> Step {
        if appwrapper.spec.suspend {
            return Step::to(Phase::Suspending);
        }
        let reason = Phase::Resetting.as_str();
        status_mut(appwrapper).conditions.clear_condition(ConditionType::PodsReady, reason, "", now);
        if is_condition_true(appwrapper, ConditionType::ResourcesDeployed) {
            if !self.deletion().delete_all(appwrapper, now).await {
                return Step::wait(Phase::Resetting, DELETION_POLL_WAIT);
            }
            status_mut(appwrapper).conditions.set_condition(ConditionType::ResourcesDeployed, false, reason, "Resources deleted for resetting AppWrapper", now);
        }

        let pause = self.grace.resolve(GraceKind::RetryPause, appwrapper);
        if let Some(wait) = remaining(transition_time(appwrapper, ConditionType::Unhealthy), pause, now) {
            return Step::wait(Phase::Resetting, wait);
        }

        status_mut(appwrapper).conditions.set_condition(ConditionType::ResourcesDeployed, true, Phase::Resuming.as_str(), "Reset complete; resuming", now);
        Step::to(Phase::Resuming)
    }

    async fn failed(&self, appwrapper: &mut AppWrapper, now: DateTime<Utc>) -> Step {
        let reason = Phase::Failed.as_str();
        let delay = self.grace.resolve(GraceKind::DeletionOnFailure, appwrapper);
        let deployed = is_condition_true(appwrapper, ConditionType::ResourcesDeployed);
        let paused = !delay.is_zero() && !appwrapper.spec.suspend;

        // Once deletion has begun the pause is over; re-pausing would move the anchor.
        if paused && deployed && !is_condition_true(appwrapper, ConditionType::DeletingResources) {
            let message = format!("{DELETION_ON_FAILURE_GRACE_PERIOD_ANNOTATION} has value {}", humantime::format_duration(delay));
            status_mut(appwrapper).conditions.set_condition(ConditionType::DeletingResources, false, "DeletionPaused", message, now);
            if let Some(wait) = remaining(transition_time(appwrapper, ConditionType::DeletingResources), delay, now) {
                return Step::wait(Phase::Failed, wait);
            }
        }

        if deployed {
            if !self.deletion().delete_all(appwrapper, now).await {
                return Step::wait(Phase::Failed, DELETION_POLL_WAIT);
            }
            let message = if !delay.is_zero() && appwrapper.spec.suspend {
                "Resources deleted after suspension of the failed AppWrapper"
            } else {
                "Resources deleted for failed AppWrapper"
            };
            status_mut(appwrapper).conditions.set_condition(ConditionType::ResourcesDeployed, false, reason, message, now);
        }
        status_mut(appwrapper).conditions.set_condition(ConditionType::QuotaReserved, false, reason, "No resources deployed", now);
        Step::to(Phase::Failed)
    }

    async fn succeeded(&self, appwrapper: &mut AppWrapper, now: DateTime<Utc>) -> Step {
        if !is_condition_true(appwrapper, ConditionType::ResourcesDeployed) {
            return Step::to(Phase::Succeeded);
        }
        let ttl = self.grace.resolve(GraceKind::SuccessTtl, appwrapper);
        if let Some(wait) = remaining(transition_time(appwrapper, ConditionType::ResourcesDeployed), ttl, now) {
            return Step::wait(Phase::Succeeded, wait);
        }
        if !self.deletion().delete_all(appwrapper, now).await {
            return Step::wait(Phase::Succeeded, DELETION_POLL_WAIT);
        }
        let message = format!("Time to live after success of {} expired", humantime::format_duration(ttl));
        status_mut(appwrapper).conditions.set_condition(ConditionType::ResourcesDeployed, false, Phase::Succeeded.as_str(), message, now);
        Step::to(Phase::Succeeded)
    }

    fn reset_or_fail(&self, appwrapper: &mut AppWrapper) -> Step {
        let limit = self.grace.retry_limit(appwrapper);
        let status = status_mut(appwrapper);
        if status.retries < limit {
            status.retries += 1;
            Step::to(Phase::Resetting)
        } else {
            Step::to(Phase::Failed)
        }
    }

    /// Deletion protocol: tear down the children, then release the finalizer.
    async fn finalize(&self, key: &ResourceKey, mut appwrapper: AppWrapper, now: DateTime<Utc>) -> Result<Outcome> {
        if !appwrapper.finalizers().iter().any(|f| f == APPWRAPPER_FINALIZER) {
            return Ok(Outcome::Done);
        }
        let original = appwrapper.status.clone().unwrap_or_default();
        let reason = Phase::Terminating.as_str();

        if is_condition_true(&appwrapper, ConditionType::ResourcesDeployed) {
            if !self.deletion().delete_all(&mut appwrapper, now).await {
                status_mut(&mut appwrapper).phase = Phase::Terminating;
                if appwrapper.status.as_ref() != Some(&original) {
                    if let Err(e) = self.store.update_status(&appwrapper).await {
                        debug!(target: TARGET, "{key} recording termination progress failed {e}");
                    }
                }
                return Ok(Outcome::RequeueAfter(DELETION_POLL_WAIT));
            }
            status_mut(&mut appwrapper).conditions.set_condition(ConditionType::ResourcesDeployed, false, reason, "Resources successfully deleted", now);
        }
        if is_condition_true(&appwrapper, ConditionType::QuotaReserved) {
            status_mut(&mut appwrapper).conditions.set_condition(ConditionType::QuotaReserved, false, reason, "No resources deployed", now);
        }

        if appwrapper.status.as_ref().is_some_and(|status| *status != original) {
            appwrapper = self.store.update_status(&appwrapper).await?;
        }
        self.store.remove_finalizer(&appwrapper).await?;
        info!(target: TARGET, "{key} finalizer removed");
        Ok(Outcome::Done)
    }

    fn aggregator(&self) -> StatusAggregator<'_> {
        StatusAggregator::new(self.kinds.as_ref(), self.pods.as_ref(), self.pod_counter.as_ref())
    }

    fn deletion(&self) -> DeletionOrchestrator<'_> {
        DeletionOrchestrator::new(self.kinds.as_ref(), self.pods.as_ref(), &self.grace)
    }
}

/// Creates one status record per component, once. Later calls leave existing records alone.
pub(crate) fn initialize_component_status(appwrapper: &mut AppWrapper) -> Result<(), TemplateError> {
    let expected = appwrapper.spec.components.len();
    if appwrapper.status.as_ref().is_some_and(|status| status.component_status.len() == expected) {
        return Ok(());
    }
    let records = appwrapper
        .spec
        .components
        .iter()
        .map(|component| {
            let identity = component_identity(&component.template)?;
            Ok(AppWrapperComponentStatus {
                name: identity.name,
                kind: identity.kind,
                api_version: identity.api_version,
                pod_sets: component.declared_pod_sets.clone(),
                conditions: vec![],
            })
        })
        .collect::<Result<Vec<_>, TemplateError>>()?;
    status_mut(appwrapper).component_status = records;
    Ok(())
}

fn status_mut(appwrapper: &mut AppWrapper) -> &mut AppWrapperStatus {
    appwrapper.status.get_or_insert_with(Default::default)
}

fn is_condition_true(appwrapper: &AppWrapper, condition_type: ConditionType) -> bool {
    appwrapper.status.as_ref().is_some_and(|status| status.conditions.is_condition_true(condition_type))
}

fn transition_time(appwrapper: &AppWrapper, condition_type: ConditionType) -> Option<DateTime<Utc>> {
    appwrapper.status.as_ref().and_then(|status| status.conditions.transition_time(condition_type))
}
