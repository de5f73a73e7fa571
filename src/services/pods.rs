use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{DeleteParams, ListParams},
    Api, Client, ResourceExt,
};
use tracing::debug;

use super::StoreError;
use crate::api::APPWRAPPER_LABEL;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<Option<&str>> for PodPhase {
    fn from(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodSummary {
    pub name: String,
    pub phase: PodPhase,
}

impl From<&Pod> for PodSummary {
    fn from(pod: &Pod) -> Self {
        let phase = pod.status.as_ref().and_then(|status| status.phase.as_deref());
        Self { name: pod.name_any(), phase: phase.into() }
    }
}

/// Pods carrying the identity label of one AppWrapper.
#[async_trait]
pub trait WorkloadPods: Send + Sync {
    async fn list(&self, namespace: &str, appwrapper_name: &str) -> Result<Vec<PodSummary>, StoreError>;
    async fn force_delete(&self, namespace: &str, pod_name: &str) -> Result<(), StoreError>;
}

pub struct KubeWorkloadPods {
    client: Client,
}

impl KubeWorkloadPods {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadPods for KubeWorkloadPods {
    async fn list(&self, namespace: &str, appwrapper_name: &str) -> Result<Vec<PodSummary>, StoreError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&format!("{APPWRAPPER_LABEL}={appwrapper_name}"));
        let pods = api.list(&params).await?;
        Ok(pods.items.iter().map(PodSummary::from).collect())
    }

    async fn force_delete(&self, namespace: &str, pod_name: &str) -> Result<(), StoreError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        debug!("force_delete: pod {namespace}/{pod_name}");
        match api.delete(pod_name, &DeleteParams::background().grace_period(0)).await {
            Ok(_) => Ok(()),
            Err(e) => match StoreError::from(e) {
                StoreError::NotFound(_) => Ok(()),
                e => Err(e),
            },
        }
    }
}
