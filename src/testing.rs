//! In-memory ClusterApi for orchestrator and controller tests

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::client::{ClusterApi, DerivedObject, ResourceKind, ResourceRef};
use crate::crd::{labels, SlurmCluster, SlurmClusterSpec, SlurmClusterStatus};
use crate::error::api_error;
use crate::Error;

const PREEXISTING_NAMESPACES: &[&str] =
    &["default", "kube-system", "kube-public", "kube-node-lease"];

#[derive(Default)]
struct State {
    objects: BTreeMap<ResourceRef, DerivedObject>,
    nodes: BTreeMap<String, Node>,
    clusters: Vec<SlurmCluster>,
    status_updates: Vec<(String, SlurmClusterStatus)>,
    finalizer_writes: Vec<(String, Vec<String>)>,
    deletes: Vec<ResourceRef>,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_status: HashSet<String>,
    node_conflicts: u32,
}

/// API server stand-in holding objects in memory
pub struct FakeClusterApi {
    state: Mutex<State>,
}

impl FakeClusterApi {
    pub fn new() -> Self {
        let mut state = State::default();
        for ns in PREEXISTING_NAMESPACES {
            state.objects.insert(
                ResourceRef::namespace(ns),
                DerivedObject::Namespace(k8s_openapi::api::core::v1::Namespace {
                    metadata: ObjectMeta {
                        name: Some(ns.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
            );
        }
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_nodes(self, nodes: Vec<Node>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for mut node in nodes {
                node.metadata.resource_version = Some("1".to_string());
                state.nodes.insert(node.name_any(), node);
            }
        }
        self
    }

    pub fn add_node(&self, mut node: Node) {
        node.metadata.resource_version = Some("1".to_string());
        self.state.lock().unwrap().nodes.insert(node.name_any(), node);
    }

    pub fn remove_node(&self, name: &str) {
        self.state.lock().unwrap().nodes.remove(name);
    }

    pub fn with_clusters(self, clusters: Vec<SlurmCluster>) -> Self {
        self.state.lock().unwrap().clusters = clusters;
        self
    }

    pub fn preexisting(&self) -> usize {
        PREEXISTING_NAMESPACES.len()
    }

    pub fn objects(&self) -> Vec<ResourceRef> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .any(|r| r.kind == kind && r.name == name)
    }

    pub fn fail_create_of(&self, name: &str) {
        self.state.lock().unwrap().fail_create.insert(name.to_string());
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.state.lock().unwrap().fail_delete.insert(name.to_string());
    }

    pub fn fail_status_of(&self, cluster: &str) {
        self.state.lock().unwrap().fail_status.insert(cluster.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_create.clear();
        state.fail_delete.clear();
        state.fail_status.clear();
    }

    pub fn conflict_next_node_writes(&self, n: u32) {
        self.state.lock().unwrap().node_conflicts = n;
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.state.lock().unwrap().nodes.get(name).cloned()
    }

    pub fn deletes(&self) -> Vec<ResourceRef> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn status_updates(&self) -> Vec<(String, SlurmClusterStatus)> {
        self.state.lock().unwrap().status_updates.clone()
    }

    pub fn finalizer_writes(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().finalizer_writes.clone()
    }

    pub fn cluster(&self, name: &str) -> Option<SlurmCluster> {
        self.state
            .lock()
            .unwrap()
            .clusters
            .iter()
            .find(|c| c.name_any() == name)
            .cloned()
    }

    fn config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<k8s_openapi::api::core::v1::ConfigMap> {
        let target = ResourceRef::namespaced(ResourceKind::ConfigMap, name, namespace);
        match self.state.lock().unwrap().objects.get(&target) {
            Some(DerivedObject::ConfigMap(cm)) => Some(cm.clone()),
            _ => None,
        }
    }

    pub fn munge_key(&self, namespace: &str, name: &str) -> Option<Vec<u8>> {
        self.config_map(namespace, name)?
            .binary_data?
            .remove("munge.key")
            .map(|b| b.0)
    }

    pub fn config_text(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        self.config_map(namespace, name)?.data?.remove(key)
    }
}

#[async_trait]
impl ClusterApi for FakeClusterApi {
    async fn list_clusters(&self) -> Result<Vec<SlurmCluster>, Error> {
        Ok(self.state.lock().unwrap().clusters.clone())
    }

    async fn patch_status(
        &self,
        cluster: &SlurmCluster,
        status: &SlurmClusterStatus,
    ) -> Result<(), Error> {
        let name = cluster.name_any();
        let mut state = self.state.lock().unwrap();
        if state.fail_status.contains(&name) {
            return Err(api_error(500, "InternalError"));
        }
        if let Some(stored) = state.clusters.iter_mut().find(|c| c.name_any() == name) {
            stored.status = Some(status.clone());
        }
        state.status_updates.push((name, status.clone()));
        Ok(())
    }

    async fn set_finalizers(
        &self,
        cluster: &SlurmCluster,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        let name = cluster.name_any();
        let mut state = self.state.lock().unwrap();
        if let Some(stored) = state.clusters.iter_mut().find(|c| c.name_any() == name) {
            stored.metadata.finalizers = Some(finalizers.clone());
        }
        state.finalizer_writes.push((name, finalizers));
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, Error> {
        Ok(self.state.lock().unwrap().nodes.values().cloned().collect())
    }

    async fn get_node(&self, name: &str) -> Result<Node, Error> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| api_error(404, "NotFound"))
    }

    async fn replace_node(&self, node: &Node) -> Result<Node, Error> {
        let mut state = self.state.lock().unwrap();
        if state.node_conflicts > 0 {
            state.node_conflicts -= 1;
            return Err(api_error(409, "Conflict"));
        }
        let name = node.name_any();
        let Some(current) = state.nodes.get(&name) else {
            return Err(api_error(404, "NotFound"));
        };
        if current.metadata.resource_version != node.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }
        let version: u64 = current
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut updated = node.clone();
        updated.metadata.resource_version = Some((version + 1).to_string());
        state.nodes.insert(name, updated.clone());
        Ok(updated)
    }

    async fn exists(&self, target: &ResourceRef) -> Result<bool, Error> {
        Ok(self.state.lock().unwrap().objects.contains_key(target))
    }

    async fn create(&self, object: &DerivedObject) -> Result<(), Error> {
        let target = object.resource_ref();
        let mut state = self.state.lock().unwrap();
        if state.fail_create.contains(&target.name) {
            return Err(api_error(500, "InternalError"));
        }
        if let Some(ns) = &target.namespace {
            if !state.objects.contains_key(&ResourceRef::namespace(ns)) {
                return Err(api_error(404, "NotFound"));
            }
        }
        if state.objects.contains_key(&target) {
            return Err(api_error(409, "AlreadyExists"));
        }
        state.objects.insert(target, object.clone());
        Ok(())
    }

    async fn apply(&self, object: &DerivedObject) -> Result<(), Error> {
        let target = object.resource_ref();
        let mut state = self.state.lock().unwrap();
        if state.fail_create.contains(&target.name) {
            return Err(api_error(500, "InternalError"));
        }
        if let Some(ns) = &target.namespace {
            if !state.objects.contains_key(&ResourceRef::namespace(ns)) {
                return Err(api_error(404, "NotFound"));
            }
        }
        state.objects.insert(target, object.clone());
        Ok(())
    }

    async fn list_names(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, Error> {
        let wanted: Vec<(&str, &str)> = selector
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .collect();
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|(r, _)| r.kind == kind && r.namespace.as_deref() == Some(namespace))
            .filter(|(_, o)| {
                let labels = o.labels();
                wanted
                    .iter()
                    .all(|(k, v)| labels.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|(r, _)| r.name.clone())
            .collect())
    }

    async fn delete(&self, target: &ResourceRef) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete.contains(&target.name) {
            return Err(api_error(500, "InternalError"));
        }
        state.deletes.push(target.clone());
        state.objects.remove(target);
        if target.kind == ResourceKind::Namespace {
            state
                .objects
                .retain(|r, _| r.namespace.as_deref() != Some(target.name.as_str()));
        }
        Ok(())
    }
}

/// SlurmCluster `name` in namespace `default` targeting `target`
pub fn slurm_cluster(name: &str, target: &str) -> SlurmCluster {
    SlurmCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: SlurmClusterSpec {
            namespace: target.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// Node carrying capability labels
pub fn labelled_node(name: &str, cpus: u32, memory_mb: u64) -> Node {
    let node_labels = BTreeMap::from([
        (labels::NODE_NAME.to_string(), name.to_string()),
        (labels::CPUS.to_string(), cpus.to_string()),
        (labels::THREADS_PER_CORE.to_string(), "1".to_string()),
        (labels::REAL_MEMORY.to_string(), memory_mb.to_string()),
    ]);
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(node_labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Node the discovery agent has not visited yet
pub fn unlabelled_node(name: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}
