use std::fmt::Display;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::{
    gen::SchemaGenerator,
    schema::{InstanceType, Schema, SchemaObject},
    JsonSchema,
};
use serde::{Deserialize, Serialize};

/// A set of heterogeneous resources deployed, monitored and removed as one unit.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "workload.codeflare.dev",
    version = "v1beta2",
    kind = "AppWrapper",
    namespaced,
    status = "AppWrapperStatus",
    shortname = "aw",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Quota Reserved", "type":"string", "jsonPath":".status.conditions[?(@.type==\"QuotaReserved\")].status"}"#,
    printcolumn = r#"{"name":"Resources Deployed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ResourcesDeployed\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppWrapperSpec {
    pub components: Vec<AppWrapperComponent>,
    /// Set by the tenant or by the admission system; false means the workload may hold resources.
    #[serde(default)]
    pub suspend: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppWrapperComponent {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub declared_pod_sets: Vec<AppWrapperPodSet>,
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub template: serde_json::Value,
}

/// Location of a pod template inside a component, e.g. `template.spec.template`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppWrapperPodSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    pub path: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppWrapperStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component_status: Vec<AppWrapperComponentStatus>,
    #[serde(default)]
    pub retries: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppWrapperComponentStatus {
    pub name: String,
    pub kind: String,
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_sets: Vec<AppWrapperPodSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Phase {
    #[default]
    #[serde(rename = "")]
    Empty,
    Suspended,
    Resuming,
    Running,
    Suspending,
    Resetting,
    Succeeded,
    Failed,
    Terminating,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Empty => "",
            Phase::Suspended => "Suspended",
            Phase::Resuming => "Resuming",
            Phase::Running => "Running",
            Phase::Suspending => "Suspending",
            Phase::Resetting => "Resetting",
            Phase::Succeeded => "Succeeded",
            Phase::Failed => "Failed",
            Phase::Terminating => "Terminating",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Empty => f.write_str("Empty"),
            phase => f.write_str(phase.as_str()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConditionType {
    QuotaReserved,
    ResourcesDeployed,
    PodsReady,
    Unhealthy,
    DeletingResources,
}

impl ConditionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConditionType::QuotaReserved => "QuotaReserved",
            ConditionType::ResourcesDeployed => "ResourcesDeployed",
            ConditionType::PodsReady => "PodsReady",
            ConditionType::Unhealthy => "Unhealthy",
            ConditionType::DeletingResources => "DeletingResources",
        }
    }
}

impl Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppWrapper {
    pub fn phase(&self) -> Phase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}

fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject { instance_type: Some(InstanceType::Object.into()), ..Default::default() };
    schema.extensions.insert("x-kubernetes-preserve-unknown-fields".to_owned(), serde_json::Value::Bool(true));
    Schema::Object(schema)
}
