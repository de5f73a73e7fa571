use k8s_openapi::chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{GraceKind, GracePolicy, TARGET};
use crate::{
    api::{AppWrapper, AppWrapperComponentStatus, ConditionType},
    common::{remaining, Conditions, ResourceKey},
    services::{DeletionMode, KindResolver, WorkloadPods},
};

/// Tears down every child of a workload. Safe to call repeatedly; returns `true` only once no
/// component and no pod of the workload is left.
pub struct DeletionOrchestrator<'a> {
    kinds: &'a dyn KindResolver,
    pods: &'a dyn WorkloadPods,
    grace: &'a GracePolicy,
}

impl<'a> DeletionOrchestrator<'a> {
    pub fn new(kinds: &'a dyn KindResolver, pods: &'a dyn WorkloadPods, grace: &'a GracePolicy) -> Self {
        Self { kinds, pods, grace }
    }

    pub async fn delete_all(&self, appwrapper: &mut AppWrapper, now: DateTime<Utc>) -> bool {
        let key = ResourceKey::from(&*appwrapper);
        let forceful_grace = self.grace.resolve(GraceKind::ForcefulDeletion, appwrapper);
        let status = appwrapper.status.get_or_insert_with(Default::default);

        status.conditions.set_condition(ConditionType::DeletingResources, true, "DeletionInitiated", "", now);

        let mut components_remaining = false;
        for component in &status.component_status {
            components_remaining = self.delete_component(&key, component, DeletionMode::Background).await || components_remaining;
        }

        let expired = remaining(status.conditions.transition_time(ConditionType::DeletingResources), forceful_grace, now).is_none();
        if components_remaining && !expired {
            debug!(target: TARGET, "{key} components still terminating");
            return false;
        }

        let pods = match self.pods.list(&key.namespace, &key.name).await {
            Ok(pods) => pods,
            Err(e) => {
                warn!(target: TARGET, "{key} listing pods failed {e}");
                return false;
            },
        };

        if !components_remaining && pods.is_empty() {
            status.conditions.clear_condition(ConditionType::DeletingResources, "DeletionComplete", "", now);
            info!(target: TARGET, "{key} all components deleted");
            return true;
        }

        if expired {
            if pods.is_empty() {
                warn!(target: TARGET, "{key} forceful deletion grace expired, deleting remaining components without grace");
                for component in &status.component_status {
                    self.delete_component(&key, component, DeletionMode::Immediate).await;
                }
            } else {
                warn!(target: TARGET, "{key} forceful deletion grace expired, deleting {} remaining pods without grace", pods.len());
                for pod in &pods {
                    if let Err(e) = self.pods.force_delete(&key.namespace, &pod.name).await {
                        warn!(target: TARGET, "{key} force deleting pod {} failed {e}", pod.name);
                    }
                }
            }
        }
        false
    }

    /// Issues the delete and reports whether the component is still present.
    async fn delete_component(&self, key: &ResourceKey, component: &AppWrapperComponentStatus, mode: DeletionMode) -> bool {
        let kind = match self.kinds.resolve(&component.api_version, &component.kind).await {
            Ok(kind) => kind,
            Err(e) => {
                warn!(target: TARGET, "{key} resolving {} {} {} failed {e}", component.api_version, component.kind, component.name);
                return true;
            },
        };
        let kind_name = &kind.kind().kind;
        if let Err(e) = kind.delete(&key.namespace, &component.name, mode).await {
            warn!(target: TARGET, "{key} deleting {kind_name} {} failed {e}", component.name);
        }
        match kind.exists(&key.namespace, &component.name).await {
            Ok(present) => present,
            Err(e) => {
                warn!(target: TARGET, "{key} checking {kind_name} {} failed {e}", component.name);
                true
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        common::Clock,
        controllers::{
            testing::{appwrapper_with_pods, initialized, FakeCluster, ManualClock},
            StatusAggregator,
        },
        services::{DeclaredPodSetCounter, PodPhase},
    };

    fn deployed(cluster: &FakeCluster, components: usize, pods: usize) -> AppWrapper {
        let appwrapper = initialized(appwrapper_with_pods("sample", components, 1));
        for component in &appwrapper.status.clone().unwrap_or_default().component_status {
            cluster.add_child("default", "sample", component);
        }
        for i in 0..pods {
            cluster.add_pod("default", "sample", &format!("sample-{i}"), PodPhase::Running);
        }
        appwrapper
    }

    #[tokio::test]
    async fn completes_in_one_pass_when_children_go_away() {
        let cluster = FakeCluster::default();
        let clock = ManualClock::default();
        let grace = GracePolicy::default();
        let mut appwrapper = deployed(&cluster, 2, 2);

        let orchestrator = DeletionOrchestrator::new(&cluster, &cluster, &grace);
        assert!(orchestrator.delete_all(&mut appwrapper, clock.now()).await);

        let status = appwrapper.status.clone().unwrap_or_default();
        let deleting = status.conditions.find_condition(ConditionType::DeletingResources).unwrap();
        assert_eq!((deleting.status.as_str(), deleting.reason.as_str()), ("False", "DeletionComplete"));
        assert_eq!(cluster.child_count(), 0);

        let aggregator = StatusAggregator::new(&cluster, &cluster, &DeclaredPodSetCounter);
        let mut components = status.component_status;
        assert_eq!(aggregator.component_status("default", &mut components, clock.now()).await.unwrap().deployed, 0);
    }

    #[tokio::test]
    async fn waits_for_terminating_children() {
        let cluster = FakeCluster::default();
        cluster.set_deletion_lag(1);
        let clock = ManualClock::default();
        let grace = GracePolicy::default();
        let mut appwrapper = deployed(&cluster, 1, 1);

        let orchestrator = DeletionOrchestrator::new(&cluster, &cluster, &grace);
        assert!(!orchestrator.delete_all(&mut appwrapper, clock.now()).await);
        assert!(appwrapper.status.as_ref().unwrap().conditions.is_condition_true(ConditionType::DeletingResources));

        clock.advance(Duration::from_secs(5));
        assert!(orchestrator.delete_all(&mut appwrapper, clock.now()).await);
    }

    #[tokio::test]
    async fn forces_deletion_after_grace() {
        let cluster = FakeCluster::default();
        cluster.set_deletion_lag(100);
        let clock = ManualClock::default();
        let grace = GracePolicy::default();
        let mut appwrapper = deployed(&cluster, 1, 2);

        let orchestrator = DeletionOrchestrator::new(&cluster, &cluster, &grace);
        assert!(!orchestrator.delete_all(&mut appwrapper, clock.now()).await);

        clock.advance(Duration::from_secs(11 * 60));
        assert!(!orchestrator.delete_all(&mut appwrapper, clock.now()).await);
        assert_eq!(cluster.pod_count(), 0);
        assert_eq!(cluster.child_count(), 1);

        assert!(!orchestrator.delete_all(&mut appwrapper, clock.now()).await);
        assert_eq!(cluster.child_count(), 0);

        assert!(orchestrator.delete_all(&mut appwrapper, clock.now()).await);
    }

    #[tokio::test]
    async fn unresolvable_kind_keeps_deletion_pending() {
        let cluster = FakeCluster::default();
        let clock = ManualClock::default();
        let grace = GracePolicy::default();
        let mut appwrapper = deployed(&cluster, 1, 0);
        cluster.unserve_kinds(true);

        let orchestrator = DeletionOrchestrator::new(&cluster, &cluster, &grace);
        assert!(!orchestrator.delete_all(&mut appwrapper, clock.now()).await);
        assert_eq!(cluster.child_count(), 1);

        cluster.unserve_kinds(false);
        assert!(orchestrator.delete_all(&mut appwrapper, clock.now()).await);
        assert_eq!(cluster.child_count(), 0);
    }

    #[tokio::test]
    async fn pod_list_failure_is_not_completion() {
        let cluster = FakeCluster::default();
        let clock = ManualClock::default();
        let grace = GracePolicy::default();
        let mut appwrapper = deployed(&cluster, 1, 0);
        cluster.fail_pod_listing(true);

        let orchestrator = DeletionOrchestrator::new(&cluster, &cluster, &grace);
        assert!(!orchestrator.delete_all(&mut appwrapper, clock.now()).await);

        cluster.fail_pod_listing(false);
        assert!(orchestrator.delete_all(&mut appwrapper, clock.now()).await);
    }
}
