use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    runtime::{controller::Action, reflector::ObjectRef, watcher::Config, Controller},
    Api, Client,
};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::{AppWrapperReconciler, ControllerError, RECONCILE_CONFLICT_WAIT, RECONCILE_ERROR_WAIT, RECONCILE_LONG_WAIT, TARGET};
use crate::{
    api::{AppWrapper, APPWRAPPER_LABEL},
    common::ResourceKey,
    services::{PodPhase, StoreError},
};

type Result<T, E = ControllerError> = std::result::Result<T, E>;

#[derive(Clone, TypedBuilder)]
pub struct AppWrapperControllerContext {
    client: Client,
    reconciler: Arc<AppWrapperReconciler>,
}

#[derive(TypedBuilder)]
pub struct AppWrapperController {
    ctx: Arc<AppWrapperControllerContext>,
}

impl AppWrapperController {
    /// Runs until the process is asked to stop. Pods carrying the identity label wake their
    /// owning AppWrapper when they finish.
    pub fn get_controller(&'_ self) -> BoxFuture<'_, ()> {
        let client = self.ctx.client.clone();
        let context = &self.ctx;

        Controller::new(Api::<AppWrapper>::all(client.clone()), Config::default())
            .watches(Api::<Pod>::all(client), Config::default().labels(APPWRAPPER_LABEL), Self::map_pod)
            .shutdown_on_signal()
            .run(Self::reconcile_appwrapper, Self::error_policy, Arc::clone(context))
            .for_each(|result| {
                match result {
                    Ok((object, action)) => debug!(target: TARGET, "reconciled {object} {action:?}"),
                    Err(e) => warn!(target: TARGET, "reconcile failed {e}"),
                }
                futures::future::ready(())
            })
            .boxed()
    }

    fn map_pod(pod: Pod) -> Option<ObjectRef<AppWrapper>> {
        let phase = PodPhase::from(pod.status.as_ref().and_then(|status| status.phase.as_deref()));
        if phase != PodPhase::Succeeded {
            return None;
        }
        let key = ResourceKey::owning_appwrapper(&pod)?;
        Some(ObjectRef::new(&key.name).within(&key.namespace))
    }

    #[allow(clippy::needless_pass_by_value)]
    fn error_policy<T>(_object: Arc<T>, err: &ControllerError, _ctx: Arc<AppWrapperControllerContext>) -> Action {
        Self::requeue_for(err)
    }

    fn requeue_for(err: &ControllerError) -> Action {
        match err {
            ControllerError::Store(StoreError::Conflict(_)) => Action::requeue(RECONCILE_CONFLICT_WAIT),
            ControllerError::Store(_) => Action::requeue(RECONCILE_ERROR_WAIT),
            ControllerError::InvalidPayload(_) | ControllerError::InvalidTemplate(_) => Action::requeue(RECONCILE_LONG_WAIT),
        }
    }

    async fn reconcile_appwrapper(resource: Arc<AppWrapper>, ctx: Arc<AppWrapperControllerContext>) -> Result<Action> {
        Self::check_uid(&resource)?;
        let key = ResourceKey::from(resource.as_ref());
        debug!(target: TARGET, "reconcile_appwrapper: {key}");
        let outcome = ctx.reconciler.reconcile(&key).await.inspect_err(|e| info!(target: TARGET, "reconcile_appwrapper: {key} {e}"))?;
        Ok(Action::from(outcome))
    }

    fn check_uid(resource: &AppWrapper) -> Result<Uuid> {
        let Some(maybe_id) = resource.metadata.uid.as_deref() else {
            return Err(ControllerError::InvalidPayload("Uid must be present".to_owned()));
        };
        Uuid::parse_str(maybe_id).map_err(|_| ControllerError::InvalidPayload("Uid in wrong format".to_owned()))
    }
}
