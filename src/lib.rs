use std::sync::Arc;

use kube::Client;
use tracing::info;

pub mod api;
pub mod common;
pub mod configuration;
pub mod controllers;
pub mod services;

pub use configuration::Configuration;
use controllers::{AppWrapperController, AppWrapperControllerContext, AppWrapperReconciler, GracePolicy};
use services::{DeclaredPodSetCounter, KindRegistry, KubeComponentMaterializer, KubeWorkloadPods, KubeWorkloadStore};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

pub async fn start(configuration: Configuration) -> Result<()> {
    info!("AppWrapper controller started");
    let client = Client::try_default().await?;
    let registry = Arc::new(KindRegistry::new(client.clone()));

    let materializer = KubeComponentMaterializer::builder()
        .client(client.clone())
        .registry(Arc::clone(&registry))
        .controller_name(configuration.controller_name.clone())
        .build();

    let reconciler = AppWrapperReconciler::builder()
        .store(Arc::new(KubeWorkloadStore::new(client.clone(), configuration.controller_name.clone())))
        .kinds(registry)
        .pods(Arc::new(KubeWorkloadPods::new(client.clone())))
        .pod_counter(Arc::new(DeclaredPodSetCounter))
        .materializer(Arc::new(materializer))
        .grace(GracePolicy::new(configuration.fault_tolerance.clone()))
        .clock(Arc::new(common::SystemClock))
        .build();

    let appwrapper_controller = AppWrapperController::builder()
        .ctx(Arc::new(AppWrapperControllerContext::builder().client(client).reconciler(Arc::new(reconciler)).build()))
        .build();

    info!("AppWrapper controller...started");
    appwrapper_controller.get_controller().await;
    info!("AppWrapper controller...stopped");
    Ok(())
}
