use async_trait::async_trait;
use kube::{
    api::{ObjectMeta, Patch, PatchParams, PostParams},
    Api, Client, ResourceExt,
};
use kube_core::PartialObjectMetaExt;
use tracing::{debug, warn};

use crate::{
    api::{AppWrapper, APPWRAPPER_FINALIZER},
    common::ResourceKey,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<kube::Error> for StoreError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) if response.code == 409 => StoreError::Conflict(response.message),
            kube::Error::Api(response) if response.code == 404 => StoreError::NotFound(response.message),
            kube::Error::Discovery(e) => StoreError::NotFound(e.to_string()),
            e => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// Versioned access to AppWrapper objects. Every write carries the resource version that was
/// read, so concurrent writers are detected rather than silently overwritten.
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn get(&self, key: &ResourceKey) -> Result<AppWrapper, StoreError>;
    async fn add_finalizer(&self, appwrapper: &AppWrapper) -> Result<AppWrapper, StoreError>;
    async fn remove_finalizer(&self, appwrapper: &AppWrapper) -> Result<(), StoreError>;
    async fn update_status(&self, appwrapper: &AppWrapper) -> Result<AppWrapper, StoreError>;
}

pub struct KubeWorkloadStore {
    client: Client,
    controller_name: String,
}

impl KubeWorkloadStore {
    pub fn new(client: Client, controller_name: String) -> Self {
        Self { client, controller_name }
    }

    fn api(&self, namespace: &str) -> Api<AppWrapper> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn patch_finalizers(&self, appwrapper: &AppWrapper, finalizers: Vec<String>) -> Result<AppWrapper, StoreError> {
        let key = ResourceKey::from(appwrapper);
        let object_meta = ObjectMeta { finalizers: Some(finalizers), resource_version: appwrapper.resource_version(), ..Default::default() };
        let meta = object_meta.into_request_partial::<AppWrapper>();
        let params = PatchParams { field_manager: Some(self.controller_name.clone()), ..Default::default() };

        match self.api(&key.namespace).patch_metadata(&key.name, &params, &Patch::Merge(&meta)).await {
            Ok(patched) => {
                let mut updated = appwrapper.clone();
                updated.metadata = patched.metadata;
                Ok(updated)
            },
            Err(e) => {
                warn!("patch_finalizers: {key} patch failed {e:?}");
                Err(e.into())
            },
        }
    }
}

#[async_trait]
impl WorkloadStore for KubeWorkloadStore {
    async fn get(&self, key: &ResourceKey) -> Result<AppWrapper, StoreError> {
        Ok(self.api(&key.namespace).get(&key.name).await?)
    }

    async fn add_finalizer(&self, appwrapper: &AppWrapper) -> Result<AppWrapper, StoreError> {
        if appwrapper.finalizers().iter().any(|f| f == APPWRAPPER_FINALIZER) {
            return Ok(appwrapper.clone());
        }
        let mut finalizers = appwrapper.finalizers().to_vec();
        finalizers.push(APPWRAPPER_FINALIZER.to_owned());
        debug!("add_finalizer: {}", ResourceKey::from(appwrapper));
        self.patch_finalizers(appwrapper, finalizers).await
    }

    async fn remove_finalizer(&self, appwrapper: &AppWrapper) -> Result<(), StoreError> {
        if !appwrapper.finalizers().iter().any(|f| f == APPWRAPPER_FINALIZER) {
            return Ok(());
        }
        let finalizers = appwrapper.finalizers().iter().filter(|f| *f != APPWRAPPER_FINALIZER).cloned().collect();
        debug!("remove_finalizer: {}", ResourceKey::from(appwrapper));
        match self.patch_finalizers(appwrapper, finalizers).await {
            Ok(_) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn update_status(&self, appwrapper: &AppWrapper) -> Result<AppWrapper, StoreError> {
        let key = ResourceKey::from(appwrapper);
        let data = serde_json::to_vec(appwrapper).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let params = PostParams { field_manager: Some(self.controller_name.clone()), ..Default::default() };
        Ok(self.api(&key.namespace).replace_status(&key.name, &params, data).await?)
    }
}
