mod kinds;
mod materializer;
mod pod_count;
mod pods;
mod store;

pub use kinds::{parse_group_version_kind, ChildKind, DeletionMode, KindRegistry, KindResolver};
pub use materializer::{prepare_component, ComponentMaterializer, CreateError, KubeComponentMaterializer};
pub use pod_count::{DeclaredPodSetCounter, PodCountCalculator};
pub use pods::{KubeWorkloadPods, PodPhase, PodSummary, WorkloadPods};
pub use store::{KubeWorkloadStore, StoreError, WorkloadStore};
