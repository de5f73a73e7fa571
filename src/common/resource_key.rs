use std::fmt::Display;

use k8s_openapi::api::core::v1::Pod;
use kube::{Resource, ResourceExt};

use crate::api::{AppWrapper, APPWRAPPER_LABEL};

pub const DEFAULT_GROUP_NAME: &str = "workload.codeflare.dev";
pub const DEFAULT_NAMESPACE_NAME: &str = "default";
pub const DEFAULT_KIND_NAME: &str = "AppWrapper";

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceKey {
    pub group: String,
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn namespaced(name: &str, namespace: &str) -> Self {
        Self { name: name.to_owned(), namespace: namespace.to_owned(), ..Default::default() }
    }

    /// Key of the workload a pod belongs to, taken from the identity label.
    pub fn owning_appwrapper(pod: &Pod) -> Option<Self> {
        let name = pod.labels().get(APPWRAPPER_LABEL)?;
        let namespace = pod.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        Some(Self::namespaced(name, &namespace))
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP_NAME.to_owned(),
            namespace: DEFAULT_NAMESPACE_NAME.to_owned(),
            name: String::default(),
            kind: DEFAULT_KIND_NAME.to_owned(),
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", create_id(&self.name, &self.namespace))
    }
}

fn create_id(name: &str, namespace: &str) -> String {
    namespace.to_owned() + "." + name
}

impl From<&AppWrapper> for ResourceKey {
    fn from(value: &AppWrapper) -> Self {
        let namespace = value.meta().namespace.clone().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        Self { group: DEFAULT_GROUP_NAME.to_owned(), namespace, name: value.name_any(), kind: DEFAULT_KIND_NAME.to_owned() }
    }
}
