use k8s_openapi::chrono::{DateTime, Utc};
use kube::ResourceExt;

use crate::{
    api::{AppWrapper, AppWrapperComponentStatus, ConditionType},
    common::Conditions,
    services::{KindResolver, PodCountCalculator, PodPhase, StoreError, WorkloadPods},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PodStatusSummary {
    pub expected: i32,
    pub pending: i32,
    pub running: i32,
    pub succeeded: i32,
    pub failed: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ComponentStatusSummary {
    pub expected: i32,
    pub deployed: i32,
}

/// Samples the live cluster state of one workload.
pub struct StatusAggregator<'a> {
    kinds: &'a dyn KindResolver,
    pods: &'a dyn WorkloadPods,
    pod_counter: &'a dyn PodCountCalculator,
}

impl<'a> StatusAggregator<'a> {
    pub fn new(kinds: &'a dyn KindResolver, pods: &'a dyn WorkloadPods, pod_counter: &'a dyn PodCountCalculator) -> Self {
        Self { kinds, pods, pod_counter }
    }

    pub async fn pod_status(&self, appwrapper: &AppWrapper) -> Result<PodStatusSummary, StoreError> {
        let namespace = appwrapper.namespace().unwrap_or_default();
        let pods = self.pods.list(&namespace, &appwrapper.name_any()).await?;

        let mut summary = PodStatusSummary { expected: self.pod_counter.expected_pod_count(appwrapper), ..Default::default() };
        for pod in pods {
            match pod.phase {
                PodPhase::Pending => summary.pending += 1,
                PodPhase::Running => summary.running += 1,
                PodPhase::Succeeded => summary.succeeded += 1,
                PodPhase::Failed => summary.failed += 1,
                PodPhase::Unknown => {},
            }
        }
        Ok(summary)
    }

    /// Checks every recorded component. A component that is gone gets its own `Unhealthy`
    /// condition. Any other failure aborts the check, including a kind the cluster cannot resolve.
    pub async fn component_status(&self, namespace: &str, components: &mut [AppWrapperComponentStatus], now: DateTime<Utc>) -> Result<ComponentStatusSummary, StoreError> {
        let mut summary = ComponentStatusSummary { expected: i32::try_from(components.len()).unwrap_or(i32::MAX), deployed: 0 };
        for component in components.iter_mut() {
            let kind = self.kinds.resolve(&component.api_version, &component.kind).await.map_err(|e| match e {
                StoreError::NotFound(message) => StoreError::Unavailable(format!("kind {} {} not resolvable: {message}", component.api_version, component.kind)),
                e => e,
            })?;
            if kind.exists(namespace, &component.name).await? {
                summary.deployed += 1;
            } else {
                component.conditions.set_condition(ConditionType::Unhealthy, true, "ComponentNotFound", "", now);
            }
        }
        Ok(summary)
    }
}
