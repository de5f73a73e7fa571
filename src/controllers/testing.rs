//! In-memory cluster used by the controller tests.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::Time,
    chrono::{DateTime, TimeDelta, TimeZone, Utc},
};
use kube::{core::GroupVersionKind, Resource, ResourceExt};
use serde_json::json;

use super::state_machine::initialize_component_status;
use crate::{
    api::{AppWrapper, AppWrapperComponent, AppWrapperComponentStatus, AppWrapperPodSet, AppWrapperSpec, APPWRAPPER_FINALIZER},
    common::{component_identity, Clock, ResourceKey, DEFAULT_NAMESPACE_NAME},
    services::{
        parse_group_version_kind, ChildKind, ComponentMaterializer, CreateError, DeletionMode, KindResolver, PodPhase, PodSummary, StoreError,
        WorkloadPods, WorkloadStore,
    },
};

/// (kind, namespace, name)
type ChildKey = (String, String, String);

struct FakeChild {
    owner: String,
    /// Existence checks left before a deleted child disappears.
    deleting: Option<u32>,
}

struct FakePod {
    owner: String,
    phase: PodPhase,
}

#[derive(Default)]
struct ClusterState {
    appwrappers: BTreeMap<ResourceKey, AppWrapper>,
    version: u64,
    children: BTreeMap<ChildKey, FakeChild>,
    pods: BTreeMap<(String, String), FakePod>,
    create_failures: VecDeque<CreateError>,
    deletion_lag: u32,
    fail_lookups: bool,
    unserved_kinds: bool,
    fail_pod_listing: bool,
    conflict_next_status_write: bool,
    status_writes: usize,
}

impl ClusterState {
    fn next_version(&mut self) -> Option<String> {
        self.version += 1;
        Some(self.version.to_string())
    }

    fn check_version(&self, appwrapper: &AppWrapper) -> Result<ResourceKey, StoreError> {
        let key = ResourceKey::from(appwrapper);
        let stored = self.appwrappers.get(&key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if stored.resource_version() == appwrapper.resource_version() {
            Ok(key)
        } else {
            Err(StoreError::Conflict(key.to_string()))
        }
    }

    fn remove_child(&mut self, key: &ChildKey) {
        if let Some(child) = self.children.remove(key) {
            let namespace = &key.1;
            let owner_has_children = self.children.iter().any(|((_, ns, _), c)| ns == namespace && c.owner == child.owner);
            if !owner_has_children {
                self.pods.retain(|(ns, _), pod| ns != namespace || pod.owner != child.owner);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    fn state(&self) -> MutexGuard<'_, ClusterState> {
        lock(&self.state)
    }

    pub fn insert(&self, mut appwrapper: AppWrapper) -> ResourceKey {
        let mut state = self.state();
        if appwrapper.metadata.namespace.is_none() {
            appwrapper.metadata.namespace = Some(DEFAULT_NAMESPACE_NAME.to_owned());
        }
        appwrapper.metadata.uid = Some(format!("00000000-0000-4000-8000-{:012}", state.appwrappers.len()));
        appwrapper.metadata.resource_version = state.next_version();
        let key = ResourceKey::from(&appwrapper);
        state.appwrappers.insert(key.clone(), appwrapper);
        key
    }

    pub fn appwrapper(&self, key: &ResourceKey) -> Option<AppWrapper> {
        self.state().appwrappers.get(key).cloned()
    }

    fn modify(&self, key: &ResourceKey, change: impl FnOnce(&mut AppWrapper)) {
        let mut state = self.state();
        let version = state.next_version();
        if let Some(appwrapper) = state.appwrappers.get_mut(key) {
            change(appwrapper);
            appwrapper.metadata.resource_version = version;
        }
    }

    pub fn set_suspend(&self, key: &ResourceKey, suspend: bool) {
        self.modify(key, |appwrapper| appwrapper.spec.suspend = suspend);
    }

    pub fn mark_deleted(&self, key: &ResourceKey) {
        self.modify(key, |appwrapper| appwrapper.metadata.deletion_timestamp = Some(Time(epoch())));
    }

    pub fn add_child(&self, namespace: &str, owner: &str, component: &AppWrapperComponentStatus) {
        self.state()
            .children
            .entry((component.kind.clone(), namespace.to_owned(), component.name.clone()))
            .or_insert(FakeChild { owner: owner.to_owned(), deleting: None });
    }

    /// Deletes a child behind the controller's back.
    pub fn remove_child(&self, namespace: &str, kind: &str, name: &str) {
        self.state().remove_child(&(kind.to_owned(), namespace.to_owned(), name.to_owned()));
    }

    pub fn child_count(&self) -> usize {
        self.state().children.len()
    }

    pub fn add_pod(&self, namespace: &str, owner: &str, name: &str, phase: PodPhase) {
        self.state().pods.insert((namespace.to_owned(), name.to_owned()), FakePod { owner: owner.to_owned(), phase });
    }

    pub fn set_pod_phases(&self, phase: PodPhase) {
        for pod in self.state().pods.values_mut() {
            pod.phase = phase;
        }
    }

    pub fn pod_count(&self) -> usize {
        self.state().pods.len()
    }

    pub fn fail_next_creates(&self, failures: impl IntoIterator<Item = CreateError>) {
        self.state().create_failures.extend(failures);
    }

    pub fn set_deletion_lag(&self, checks: u32) {
        self.state().deletion_lag = checks;
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.state().fail_lookups = fail;
    }

    /// Makes every kind unknown to the resolver, as when discovery loses a group.
    pub fn unserve_kinds(&self, unserved: bool) {
        self.state().unserved_kinds = unserved;
    }

    pub fn fail_pod_listing(&self, fail: bool) {
        self.state().fail_pod_listing = fail;
    }

    pub fn conflict_next_status_write(&self) {
        self.state().conflict_next_status_write = true;
    }

    pub fn status_writes(&self) -> usize {
        self.state().status_writes
    }
}

fn lock(state: &Mutex<ClusterState>) -> MutexGuard<'_, ClusterState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl WorkloadStore for FakeCluster {
    async fn get(&self, key: &ResourceKey) -> Result<AppWrapper, StoreError> {
        self.appwrapper(key).ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn add_finalizer(&self, appwrapper: &AppWrapper) -> Result<AppWrapper, StoreError> {
        let mut state = self.state();
        let key = state.check_version(appwrapper)?;
        let version = state.next_version();
        let stored = state.appwrappers.get_mut(&key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if !stored.finalizers().iter().any(|f| f == APPWRAPPER_FINALIZER) {
            stored.finalizers_mut().push(APPWRAPPER_FINALIZER.to_owned());
            stored.metadata.resource_version = version;
        }
        Ok(stored.clone())
    }

    async fn remove_finalizer(&self, appwrapper: &AppWrapper) -> Result<(), StoreError> {
        let mut state = self.state();
        let key = state.check_version(appwrapper)?;
        let version = state.next_version();
        let Some(stored) = state.appwrappers.get_mut(&key) else {
            return Ok(());
        };
        stored.finalizers_mut().retain(|f| f != APPWRAPPER_FINALIZER);
        stored.metadata.resource_version = version;
        if stored.meta().deletion_timestamp.is_some() && stored.finalizers().is_empty() {
            state.appwrappers.remove(&key);
        }
        Ok(())
    }

    async fn update_status(&self, appwrapper: &AppWrapper) -> Result<AppWrapper, StoreError> {
        let mut state = self.state();
        if state.conflict_next_status_write {
            state.conflict_next_status_write = false;
            return Err(StoreError::Conflict("injected".to_owned()));
        }
        let key = state.check_version(appwrapper)?;
        let version = state.next_version();
        state.status_writes += 1;
        let stored = state.appwrappers.get_mut(&key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        stored.status.clone_from(&appwrapper.status);
        stored.metadata.resource_version = version;
        Ok(stored.clone())
    }
}

struct FakeKind {
    gvk: GroupVersionKind,
    state: Arc<Mutex<ClusterState>>,
}

#[async_trait]
impl ChildKind for FakeKind {
    fn kind(&self) -> &GroupVersionKind {
        &self.gvk
    }

    async fn exists(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        let mut state = lock(&self.state);
        let key = (self.gvk.kind.clone(), namespace.to_owned(), name.to_owned());
        let deleting = match state.children.get_mut(&key) {
            None => return Ok(false),
            Some(child) => {
                let deleting = child.deleting;
                if let Some(checks) = child.deleting.as_mut().filter(|checks| **checks > 0) {
                    *checks -= 1;
                }
                deleting
            },
        };
        if deleting == Some(0) {
            state.remove_child(&key);
            return Ok(false);
        }
        Ok(true)
    }

    async fn delete(&self, namespace: &str, name: &str, mode: DeletionMode) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        let key = (self.gvk.kind.clone(), namespace.to_owned(), name.to_owned());
        let lag = state.deletion_lag;
        match mode {
            DeletionMode::Immediate => state.remove_child(&key),
            DeletionMode::Background => {
                if let Some(child) = state.children.get_mut(&key) {
                    child.deleting.get_or_insert(lag);
                }
            },
        }
        Ok(())
    }
}

#[async_trait]
impl KindResolver for FakeCluster {
    async fn resolve(&self, api_version: &str, kind: &str) -> Result<Arc<dyn ChildKind>, StoreError> {
        {
            let state = self.state();
            if state.fail_lookups {
                return Err(StoreError::Unavailable("discovery down".to_owned()));
            }
            if state.unserved_kinds {
                return Err(StoreError::NotFound(format!("{api_version} {kind} is not served")));
            }
        }
        let gvk = parse_group_version_kind(api_version, kind)?;
        Ok(Arc::new(FakeKind { gvk, state: Arc::clone(&self.state) }))
    }
}

#[async_trait]
impl WorkloadPods for FakeCluster {
    async fn list(&self, namespace: &str, appwrapper_name: &str) -> Result<Vec<PodSummary>, StoreError> {
        let state = self.state();
        if state.fail_pod_listing {
            return Err(StoreError::Unavailable("pod listing down".to_owned()));
        }
        Ok(state
            .pods
            .iter()
            .filter(|((ns, _), pod)| ns == namespace && pod.owner == appwrapper_name)
            .map(|((_, name), pod)| PodSummary { name: name.clone(), phase: pod.phase })
            .collect())
    }

    async fn force_delete(&self, namespace: &str, pod_name: &str) -> Result<(), StoreError> {
        self.state().pods.remove(&(namespace.to_owned(), pod_name.to_owned()));
        Ok(())
    }
}

#[async_trait]
impl ComponentMaterializer for FakeCluster {
    async fn create_components(&self, appwrapper: &AppWrapper) -> Result<(), CreateError> {
        if let Some(failure) = self.state().create_failures.pop_front() {
            return Err(failure);
        }
        let namespace = appwrapper.namespace().unwrap_or_default();
        let owner = appwrapper.name_any();
        let mut state = self.state();
        for component in &appwrapper.spec.components {
            let identity = component_identity(&component.template).map_err(|e| CreateError::fatal(e.to_string()))?;
            state.children.entry((identity.kind, namespace.clone(), identity.name)).or_insert(FakeChild { owner: owner.clone(), deleting: None });
        }
        Ok(())
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default()
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self { now: Mutex::new(epoch()) }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += TimeDelta::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A workload of `components` jobs named `<name>-<i>`, each declaring `replicas` pods.
pub fn appwrapper_with_pods(name: &str, components: usize, replicas: i32) -> AppWrapper {
    let components = (0..components)
        .map(|i| AppWrapperComponent {
            declared_pod_sets: vec![AppWrapperPodSet { replicas: Some(replicas), path: "template.spec.template".to_owned() }],
            template: json!({
                "apiVersion": "batch/v1",
                "kind": "Job",
                "metadata": {"name": format!("{name}-{i}")},
                "spec": {"template": {"spec": {"restartPolicy": "Never"}}}
            }),
        })
        .collect();
    let mut appwrapper = AppWrapper::new(name, AppWrapperSpec { components, suspend: false });
    appwrapper.metadata.namespace = Some(DEFAULT_NAMESPACE_NAME.to_owned());
    appwrapper
}

pub fn initialized(mut appwrapper: AppWrapper) -> AppWrapper {
    initialize_component_status(&mut appwrapper).unwrap();
    appwrapper
}
