//! In-memory resource store
//!
//! Behaves like the real store where the client depends on it:
//! server-assigned uids, deletions that stay visible for a configurable
//! number of lookups, and creates rejected while a same-named object is
//! still terminating.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use caib_api::{
    ConfigMap, Container, ImageBuild, ImageBuildStatus, ObjectMeta, Phase, Pod, PodSpec, PodStatus,
    SandboxRole, BUILD_NAME_LABEL,
};
use chrono::Utc;

use crate::host::store::{ResourceStore, StoreError};
use crate::host::transport::KubectlError;
use crate::watch::sandbox_labels;

const BUILD_KIND: &str = "ImageBuild";
const CONFIG_MAP_KIND: &str = "ConfigMap";

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// An object that was deleted but is still visible
#[derive(Debug, Clone, Copy)]
struct Terminating {
    /// Lookups left before the object disappears
    remaining: u32,
}

#[derive(Debug, Default)]
struct StoreState {
    builds: BTreeMap<Key, ImageBuild>,
    config_maps: BTreeMap<Key, ConfigMap>,
    pods: Vec<Pod>,
    terminating_builds: BTreeMap<Key, Terminating>,
    terminating_config_maps: BTreeMap<Key, Terminating>,
    /// Statuses applied one per lookup, keyed by build name
    scripted: BTreeMap<String, VecDeque<ImageBuildStatus>>,
    deletion_lag: u32,
    fail_config_map_update: bool,
    fail_lookups: bool,
    auto_upload_pods: bool,
    next_uid: u64,
    calls: Vec<String>,
}

/// Remove `key` from `objects` once its terminating countdown runs out.
///
/// Called on every lookup of a terminating object.
fn tick<T>(objects: &mut BTreeMap<Key, T>, terminating: &mut BTreeMap<Key, Terminating>, key: &Key) {
    let Some(entry) = terminating.get_mut(key) else {
        return;
    };
    if entry.remaining == 0 {
        terminating.remove(key);
        objects.remove(key);
    } else {
        entry.remaining -= 1;
    }
}

fn finish_delete<T>(objects: &mut BTreeMap<Key, T>, terminating: &mut BTreeMap<Key, Terminating>, key: Key, lag: u32) {
    if lag == 0 {
        objects.remove(&key);
    } else {
        terminating.entry(key).or_insert(Terminating { remaining: lag });
    }
}

fn lookup_failure(kind: &str, name: &str) -> StoreError {
    StoreError::Transport(KubectlError::Failed {
        command: format!("get {} {}", kind, name),
        status: "exit status: 1".to_string(),
        stderr: "Unable to connect to the server: connection refused".to_string(),
    })
}

/// Mock resource store for tests
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deleted objects stay visible for `lookups` further gets.
    pub fn set_deletion_lag(&self, lookups: u32) {
        self.state.lock().unwrap().deletion_lag = lookups;
    }

    /// Reject every ConfigMap update.
    pub fn fail_config_map_updates(&self) {
        self.state.lock().unwrap().fail_config_map_update = true;
    }

    /// Fail every `get_*` with a transport error.
    pub fn fail_lookups(&self) {
        self.state.lock().unwrap().fail_lookups = true;
    }

    /// Start a running upload pod whenever a build that needs uploads is created.
    pub fn auto_upload_pods(&self) {
        self.state.lock().unwrap().auto_upload_pods = true;
    }

    /// Queue statuses for `build_name`; each lookup of an existing build
    /// applies the next one and the last stays in place.
    pub fn script_statuses(&self, build_name: &str, statuses: impl IntoIterator<Item = ImageBuildStatus>) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .entry(build_name.to_string())
            .or_default()
            .extend(statuses);
    }

    /// Insert an object directly, bypassing create semantics.
    pub fn seed_build(&self, mut build: ImageBuild) {
        let mut state = self.state.lock().unwrap();
        state.next_uid += 1;
        if build.metadata.uid.is_empty() {
            build.metadata.uid = format!("uid-{}", state.next_uid);
        }
        let k = key(&build.metadata.namespace, build.name());
        state.builds.insert(k, build);
    }

    pub fn seed_config_map(&self, config_map: ConfigMap) {
        let mut state = self.state.lock().unwrap();
        let k = key(&config_map.metadata.namespace, config_map.name());
        state.config_maps.insert(k, config_map);
    }

    pub fn add_pod(&self, pod: Pod) {
        self.state.lock().unwrap().pods.push(pod);
    }

    /// Add a `role` sandbox for `build_name` in the given pod phase.
    pub fn add_sandbox(&self, namespace: &str, build_name: &str, role: SandboxRole, container: &str, phase: &str) -> Pod {
        let mut metadata = ObjectMeta::named(format!("{}-{}", build_name, role.label_value()), namespace);
        metadata.labels = sandbox_labels(build_name, role);
        let pod = Pod {
            metadata,
            spec: PodSpec {
                containers: vec![Container {
                    name: container.to_string(),
                }],
            },
            status: PodStatus {
                phase: Some(phase.to_string()),
            },
        };
        self.add_pod(pod.clone());
        pod
    }

    /// Sets a build's status immediately.
    pub fn set_status(&self, namespace: &str, name: &str, status: ImageBuildStatus) {
        if let Some(build) = self.state.lock().unwrap().builds.get_mut(&key(namespace, name)) {
            build.status = status;
        }
    }

    /// Current build, ignoring terminating state and scripted statuses.
    pub fn build(&self, namespace: &str, name: &str) -> Option<ImageBuild> {
        self.state.lock().unwrap().builds.get(&key(namespace, name)).cloned()
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state.lock().unwrap().config_maps.get(&key(namespace, name)).cloned()
    }

    pub fn build_count(&self) -> usize {
        self.state.lock().unwrap().builds.len()
    }

    pub fn config_map_count(&self) -> usize {
        self.state.lock().unwrap().config_maps.len()
    }

    /// Operations performed, as `op kind/name`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl ResourceStore for MockStore {
    fn get_build(&self, namespace: &str, name: &str) -> Result<Option<ImageBuild>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get {}/{}", BUILD_KIND, name));
        if state.fail_lookups {
            return Err(lookup_failure(BUILD_KIND, name));
        }
        let k = key(namespace, name);

        let state = &mut *state;
        tick(&mut state.builds, &mut state.terminating_builds, &k);

        let Some(build) = state.builds.get_mut(&k) else {
            return Ok(None);
        };
        if let Some(status) = state.scripted.get_mut(name).and_then(|queue| queue.pop_front()) {
            build.status = status;
        }
        Ok(Some(build.clone()))
    }

    fn list_builds(&self, namespace: &str) -> Result<Vec<ImageBuild>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("list {}", BUILD_KIND));
        Ok(state
            .builds
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, b)| b.clone())
            .collect())
    }

    fn create_build(&self, build: &ImageBuild) -> Result<ImageBuild, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create {}/{}", BUILD_KIND, build.name()));
        let k = key(&build.metadata.namespace, build.name());
        if state.builds.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                kind: BUILD_KIND,
                name: build.name().to_string(),
            });
        }

        state.next_uid += 1;
        let mut created = build.clone();
        created.metadata.uid = format!("uid-{}", state.next_uid);
        created.metadata.resource_version = Some(state.next_uid.to_string());
        created.metadata.creation_timestamp = Some(Utc::now());
        created.status = ImageBuildStatus {
            phase: Phase::Pending,
            ..ImageBuildStatus::default()
        };
        state.builds.insert(k, created.clone());

        if state.auto_upload_pods && created.spec.input_files_server {
            let mut metadata = ObjectMeta::named(format!("{}-upload-pod", created.name()), &created.metadata.namespace);
            metadata.labels = sandbox_labels(created.name(), SandboxRole::UploadTarget);
            state.pods.push(Pod {
                metadata,
                spec: PodSpec {
                    containers: vec![Container {
                        name: "fileserver".to_string(),
                    }],
                },
                status: PodStatus {
                    phase: Some("Running".to_string()),
                },
            });
        }
        Ok(created)
    }

    fn delete_build(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete {}/{}", BUILD_KIND, name));
        let k = key(namespace, name);
        if !state.builds.contains_key(&k) {
            return Err(StoreError::NotFound {
                kind: BUILD_KIND,
                name: name.to_string(),
            });
        }
        state.pods.retain(|p| p.metadata.labels.get(BUILD_NAME_LABEL).map(String::as_str) != Some(name));

        let lag = state.deletion_lag;
        let state = &mut *state;
        finish_delete(&mut state.builds, &mut state.terminating_builds, k, lag);
        Ok(())
    }

    fn patch_build_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<ImageBuild, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("patch {}/{}", BUILD_KIND, name));
        let build = state
            .builds
            .get_mut(&key(namespace, name))
            .ok_or_else(|| StoreError::NotFound {
                kind: BUILD_KIND,
                name: name.to_string(),
            })?;
        build
            .metadata
            .annotations
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(build.clone())
    }

    fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get {}/{}", CONFIG_MAP_KIND, name));
        if state.fail_lookups {
            return Err(lookup_failure(CONFIG_MAP_KIND, name));
        }
        let k = key(namespace, name);
        let state = &mut *state;
        tick(&mut state.config_maps, &mut state.terminating_config_maps, &k);
        Ok(state.config_maps.get(&k).cloned())
    }

    fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create {}/{}", CONFIG_MAP_KIND, config_map.name()));
        let k = key(&config_map.metadata.namespace, config_map.name());
        if state.config_maps.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                kind: CONFIG_MAP_KIND,
                name: config_map.name().to_string(),
            });
        }
        state.next_uid += 1;
        let mut created = config_map.clone();
        created.metadata.uid = format!("uid-{}", state.next_uid);
        created.metadata.creation_timestamp = Some(Utc::now());
        state.config_maps.insert(k, created.clone());
        Ok(created)
    }

    fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("update {}/{}", CONFIG_MAP_KIND, config_map.name()));
        if state.fail_config_map_update {
            return Err(StoreError::Rejected {
                kind: CONFIG_MAP_KIND,
                name: config_map.name().to_string(),
                message: "injected update failure".to_string(),
            });
        }
        let k = key(&config_map.metadata.namespace, config_map.name());
        match state.config_maps.get_mut(&k) {
            Some(existing) => {
                *existing = config_map.clone();
                Ok(existing.clone())
            }
            None => Err(StoreError::NotFound {
                kind: CONFIG_MAP_KIND,
                name: config_map.name().to_string(),
            }),
        }
    }

    fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete {}/{}", CONFIG_MAP_KIND, name));
        let k = key(namespace, name);
        if !state.config_maps.contains_key(&k) {
            return Err(StoreError::NotFound {
                kind: CONFIG_MAP_KIND,
                name: name.to_string(),
            });
        }
        let lag = state.deletion_lag;
        let state = &mut *state;
        finish_delete(&mut state.config_maps, &mut state.terminating_config_maps, k, lag);
        Ok(())
    }

    fn list_pods(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list Pod".to_string());
        Ok(state
            .pods
            .iter()
            .filter(|p| p.metadata.namespace == namespace)
            .filter(|p| labels.iter().all(|(k, v)| p.metadata.labels.get(k) == Some(v)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caib_api::ImageBuildSpec;

    fn build(name: &str) -> ImageBuild {
        ImageBuild::new(ObjectMeta::named(name, "default"), ImageBuildSpec::default())
    }

    #[test]
    fn test_create_assigns_uid() {
        let store = MockStore::new();
        let created = store.create_build(&build("a")).unwrap();
        assert!(!created.metadata.uid.is_empty());
        assert!(created.metadata.creation_timestamp.is_some());
        assert_eq!(created.phase(), Phase::Pending);
    }

    #[test]
    fn test_deletion_lag_keeps_object_visible() {
        let store = MockStore::new();
        store.set_deletion_lag(2);
        store.create_build(&build("a")).unwrap();
        store.delete_build("default", "a").unwrap();

        assert!(store.get_build("default", "a").unwrap().is_some());
        assert!(matches!(
            store.create_build(&build("a")),
            Err(StoreError::AlreadyExists { .. })
        ));
        assert!(store.get_build("default", "a").unwrap().is_some());
        assert!(store.get_build("default", "a").unwrap().is_none());
        assert!(store.create_build(&build("a")).is_ok());
    }

    #[test]
    fn test_scripted_statuses_last_sticks() {
        let store = MockStore::new();
        store.create_build(&build("a")).unwrap();
        store.script_statuses(
            "a",
            [
                ImageBuildStatus {
                    phase: Phase::Running,
                    ..Default::default()
                },
                ImageBuildStatus {
                    phase: Phase::Completed,
                    ..Default::default()
                },
            ],
        );

        let phases: Vec<Phase> = (0..3)
            .map(|_| store.get_build("default", "a").unwrap().unwrap().phase())
            .collect();
        assert_eq!(phases, vec![Phase::Running, Phase::Completed, Phase::Completed]);
    }

    #[test]
    fn test_list_pods_filters_labels() {
        let store = MockStore::new();
        store.add_sandbox("default", "a", SandboxRole::UploadTarget, "fileserver", "Running");
        store.add_sandbox("default", "a", SandboxRole::ArtifactServer, "fileserver", "Pending");
        store.add_sandbox("default", "b", SandboxRole::UploadTarget, "fileserver", "Running");

        let pods = store
            .list_pods("default", &sandbox_labels("a", SandboxRole::UploadTarget))
            .unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name(), "a-upload-pod");
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let store = MockStore::new();
        let err = store.delete_config_map("default", "missing").unwrap_err();
        assert!(err.is_not_found());
    }
}
