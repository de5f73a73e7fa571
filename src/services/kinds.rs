use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    batch::v1::Job,
    core::v1::{ConfigMap, Pod, Service},
};
use kube::{
    api::{ApiResource, DeleteParams, DynamicObject},
    core::{GroupVersion, GroupVersionKind},
    discovery, Api, Client,
};
use tracing::{debug, info};

use super::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletionMode {
    /// Dependents are garbage collected after the owner is gone.
    Background,
    /// Zero grace period.
    Immediate,
}

/// Operations the controller needs on one kind of child resource.
#[async_trait]
pub trait ChildKind: Send + Sync {
    fn kind(&self) -> &GroupVersionKind;
    async fn exists(&self, namespace: &str, name: &str) -> Result<bool, StoreError>;
    /// Deleting an object that is already gone succeeds.
    async fn delete(&self, namespace: &str, name: &str, mode: DeletionMode) -> Result<(), StoreError>;
}

/// Maps an `apiVersion`/`kind` pair to the operations for that kind.
///
/// Returns `StoreError::NotFound` when the cluster does not serve the kind.
#[async_trait]
pub trait KindResolver: Send + Sync {
    async fn resolve(&self, api_version: &str, kind: &str) -> Result<Arc<dyn ChildKind>, StoreError>;
}

pub fn parse_group_version_kind(api_version: &str, kind: &str) -> Result<GroupVersionKind, StoreError> {
    if kind.is_empty() {
        return Err(StoreError::NotFound(format!("empty kind for {api_version}")));
    }
    let group_version: GroupVersion = api_version.parse().map_err(|e| StoreError::NotFound(format!("{api_version}: {e}")))?;
    Ok(group_version.with_kind(kind))
}

/// Cache of resolved kinds. Common built-in kinds are pinned up front, anything else is looked up
/// through discovery once and remembered.
pub struct KindRegistry {
    client: Client,
    entries: Mutex<HashMap<GroupVersionKind, ApiResource>>,
}

impl KindRegistry {
    pub fn new(client: Client) -> Self {
        let pinned = [
            ApiResource::erase::<Pod>(&()),
            ApiResource::erase::<Service>(&()),
            ApiResource::erase::<ConfigMap>(&()),
            ApiResource::erase::<Deployment>(&()),
            ApiResource::erase::<StatefulSet>(&()),
            ApiResource::erase::<Job>(&()),
        ];
        let entries = pinned.into_iter().map(|resource| (GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind), resource)).collect();
        Self { client, entries: Mutex::new(entries) }
    }

    pub async fn api_resource(&self, gvk: &GroupVersionKind) -> Result<ApiResource, StoreError> {
        let cached = {
            let entries = self.entries.lock().map_err(|_| StoreError::Unavailable("kind registry lock poisoned".to_owned()))?;
            entries.get(gvk).cloned()
        };
        if let Some(resource) = cached {
            return Ok(resource);
        }

        let (resource, _capabilities) = discovery::pinned_kind(&self.client, gvk).await?;
        info!("api_resource: discovered {}/{} {} as {}", gvk.group, gvk.version, gvk.kind, resource.plural);
        let mut entries = self.entries.lock().map_err(|_| StoreError::Unavailable("kind registry lock poisoned".to_owned()))?;
        entries.insert(gvk.clone(), resource.clone());
        Ok(resource)
    }
}

#[async_trait]
impl KindResolver for KindRegistry {
    async fn resolve(&self, api_version: &str, kind: &str) -> Result<Arc<dyn ChildKind>, StoreError> {
        let gvk = parse_group_version_kind(api_version, kind)?;
        let resource = self.api_resource(&gvk).await?;
        Ok(Arc::new(DynamicChildKind { client: self.client.clone(), gvk, resource }))
    }
}

struct DynamicChildKind {
    client: Client,
    gvk: GroupVersionKind,
    resource: ApiResource,
}

impl DynamicChildKind {
    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

#[async_trait]
impl ChildKind for DynamicChildKind {
    fn kind(&self) -> &GroupVersionKind {
        &self.gvk
    }

    async fn exists(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self.api(namespace).get_metadata_opt(name).await?.is_some())
    }

    async fn delete(&self, namespace: &str, name: &str, mode: DeletionMode) -> Result<(), StoreError> {
        let params = match mode {
            DeletionMode::Background => DeleteParams::background(),
            DeletionMode::Immediate => DeleteParams::background().grace_period(0),
        };
        match self.api(namespace).delete(name, &params).await {
            Ok(_) => {
                debug!("delete: {} {namespace}/{name} {mode:?}", self.gvk.kind);
                Ok(())
            },
            Err(e) => match StoreError::from(e) {
                StoreError::NotFound(_) => Ok(()),
                e => Err(e),
            },
        }
    }
}
