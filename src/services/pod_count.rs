use crate::api::AppWrapper;

pub trait PodCountCalculator: Send + Sync {
    fn expected_pod_count(&self, appwrapper: &AppWrapper) -> i32;
}

/// Counts the pods declared by the components' pod sets. A pod set without a replica count
/// contributes one pod.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeclaredPodSetCounter;

impl PodCountCalculator for DeclaredPodSetCounter {
    fn expected_pod_count(&self, appwrapper: &AppWrapper) -> i32 {
        appwrapper
            .spec
            .components
            .iter()
            .flat_map(|component| component.declared_pod_sets.iter())
            .map(|pod_set| pod_set.replicas.unwrap_or(1).max(0))
            .fold(0_i32, i32::saturating_add)
    }
}
