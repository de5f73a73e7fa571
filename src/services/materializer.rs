use std::sync::Arc;

use async_trait::async_trait;
use kube::{
    api::{DynamicObject, PostParams},
    Api, Client, Resource, ResourceExt,
};
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use super::{parse_group_version_kind, KindRegistry, StoreError};
use crate::{
    api::{AppWrapper, AppWrapperComponent, APPWRAPPER_LABEL},
    common::{inject_label, ResourceKey},
};

/// Failure to create a component. Fatal failures will not go away by retrying.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CreateError {
    pub message: String,
    pub fatal: bool,
}

impl CreateError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self { message: message.into(), fatal: true }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), fatal: false }
    }
}

/// Creates the child objects described by an AppWrapper's component templates.
#[async_trait]
pub trait ComponentMaterializer: Send + Sync {
    async fn create_components(&self, appwrapper: &AppWrapper) -> Result<(), CreateError>;
}

/// Builds the object to create for one component: identity label stamped on the object and on
/// every declared pod template, namespace pinned to the AppWrapper's, controller owner reference set.
pub fn prepare_component(appwrapper: &AppWrapper, component: &AppWrapperComponent) -> Result<DynamicObject, CreateError> {
    let name = appwrapper.name_any();
    let namespace = appwrapper.namespace().unwrap_or_default();
    let owner = appwrapper.controller_owner_ref(&()).ok_or_else(|| CreateError::transient(format!("{name} has no uid yet")))?;

    let mut template = component.template.clone();
    for pod_set in &component.declared_pod_sets {
        inject_label(&mut template, &pod_set.path, APPWRAPPER_LABEL, &name).map_err(|e| CreateError::fatal(e.to_string()))?;
    }

    let mut object: DynamicObject = serde_json::from_value(template).map_err(|e| CreateError::fatal(format!("invalid component template: {e}")))?;
    if object.types.is_none() {
        return Err(CreateError::fatal("component template has no apiVersion or kind"));
    }
    match object.metadata.namespace.as_deref() {
        Some(requested) if !requested.is_empty() && requested != namespace => {
            return Err(CreateError::fatal(format!("component namespace {requested} differs from AppWrapper namespace {namespace}")));
        },
        _ => object.metadata.namespace = Some(namespace),
    }
    object.labels_mut().insert(APPWRAPPER_LABEL.to_owned(), name);
    object.owner_references_mut().push(owner);
    Ok(object)
}

#[derive(TypedBuilder)]
pub struct KubeComponentMaterializer {
    client: Client,
    registry: Arc<KindRegistry>,
    controller_name: String,
}

impl KubeComponentMaterializer {
    async fn create(&self, key: &ResourceKey, object: &DynamicObject) -> Result<(), CreateError> {
        let types = object.types.as_ref().ok_or_else(|| CreateError::fatal("component template has no apiVersion or kind"))?;
        let gvk = parse_group_version_kind(&types.api_version, &types.kind).map_err(|e| CreateError::fatal(e.to_string()))?;
        let resource = match self.registry.api_resource(&gvk).await {
            Ok(resource) => resource,
            Err(StoreError::NotFound(e)) => return Err(CreateError::fatal(format!("kind {} is not served: {e}", types.kind))),
            Err(e) => return Err(CreateError::transient(e.to_string())),
        };

        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &key.namespace, &resource);
        let params = PostParams { field_manager: Some(self.controller_name.clone()), ..Default::default() };
        let name = object.name_any();
        match api.create(&params, object).await {
            Ok(_) => {
                info!("create_components: {key} created {} {name}", types.kind);
                Ok(())
            },
            Err(kube::Error::Api(response)) if response.code == 409 => {
                debug!("create_components: {key} {} {name} already exists", types.kind);
                Ok(())
            },
            Err(kube::Error::Api(response)) if response.code == 400 || response.code == 422 => Err(CreateError::fatal(response.message)),
            Err(e) => Err(CreateError::transient(e.to_string())),
        }
    }
}

#[async_trait]
impl ComponentMaterializer for KubeComponentMaterializer {
    async fn create_components(&self, appwrapper: &AppWrapper) -> Result<(), CreateError> {
        let key = ResourceKey::from(appwrapper);
        for component in &appwrapper.spec.components {
            let object = prepare_component(appwrapper, component)?;
            self.create(&key, &object).await?;
        }
        Ok(())
    }
}
